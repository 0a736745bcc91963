//! Pairwise user-similarity engine
//!
//! Compares two users' taste maps, shared-item ratings and favored
//! persons, and persists one symmetric row per unordered pair. Batch
//! computation discovers candidates through shared-item co-occurrence and
//! runs in bounded chunks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    BatchPage, BatchReport, ItemKey, SimilarityScore, TasteMap, UserPair, WatchEntry,
};
use crate::services::batch::run_chunked;
use crate::services::taste_map::TasteMapService;
use crate::store::{SimilarityStore, WatchStore};

/// Recorded in `computed_by` on every row this engine writes
const ENGINE_NAME: &str = "similarity-engine/v1";

/// Rating difference on a shared item still counted as agreement
const AGREEMENT_TOLERANCE: f64 = 1.5;

/// Combines the three sub-scores into the overall match
///
/// This is the only place the weighting lives; every caller that needs an
/// overall match goes through here so the formula cannot drift between
/// call sites.
pub fn overall_match(movie_score: f64, taste_similarity: f64, person_overlap: f64) -> f64 {
    movie_score * 0.5 + taste_similarity * 0.3 + person_overlap * 0.2
}

/// Pearson correlation of two equal-length samples
///
/// `None` when fewer than two points or either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Cosine similarity between two weight maps over the union of their keys
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    for (key, wa) in a {
        if let Some(wb) = b.get(key) {
            dot += wa * wb;
        }
    }
    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Jaccard overlap of two key sets
pub fn jaccard<T: std::hash::Hash + Eq>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Outcome of one pair computation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Computed(SimilarityScore),
    /// Pair has no basis for comparison; nothing was persisted
    NotEnoughData { message: String },
}

pub struct SimilarityEngine {
    watch_store: Arc<dyn WatchStore>,
    similarity_store: Arc<dyn SimilarityStore>,
    taste_maps: Arc<TasteMapService>,
    config: EngineConfig,
}

impl SimilarityEngine {
    pub fn new(
        watch_store: Arc<dyn WatchStore>,
        similarity_store: Arc<dyn SimilarityStore>,
        taste_maps: Arc<TasteMapService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            watch_store,
            similarity_store,
            taste_maps,
            config,
        }
    }

    /// Computes and persists the similarity between two users
    ///
    /// The pair is canonicalized before any read or write. Two users with
    /// no shared items produce no row and an explicit "not enough data"
    /// outcome.
    pub async fn compute_pair(&self, x: Uuid, y: Uuid) -> AppResult<PairOutcome> {
        let pair = UserPair::new(x, y).ok_or_else(|| {
            AppError::InvalidInput("Cannot compare a user with themselves".to_string())
        })?;

        let history_a = self.watch_store.watch_history(pair.a()).await?;
        let history_b = self.watch_store.watch_history(pair.b()).await?;

        let shared = shared_ratings(&history_a, &history_b);
        if shared.is_empty() {
            tracing::debug!(user_a = %pair.a(), user_b = %pair.b(), "No shared items, skipping pair");
            return Ok(PairOutcome::NotEnoughData {
                message: "Users share no watched items".to_string(),
            });
        }

        let taste_a = self.taste_maps.taste_map(pair.a()).await?;
        let taste_b = self.taste_maps.taste_map(pair.b()).await?;

        let score = score_pair(pair, &history_a, &history_b, &shared, &taste_a, &taste_b);
        self.similarity_store.upsert(&score).await?;

        tracing::debug!(
            user_a = %pair.a(),
            user_b = %pair.b(),
            overall = score.overall_match,
            shared = shared.len(),
            "Similarity pair persisted"
        );

        Ok(PairOutcome::Computed(score))
    }

    /// Users similar to `user_id`, best match first
    ///
    /// `include_all` drops the overall-match threshold, returning stored
    /// below-threshold pairs as well.
    pub async fn similar_users(
        &self,
        user_id: Uuid,
        limit: usize,
        include_all: bool,
    ) -> AppResult<Vec<SimilarityScore>> {
        let floor = if include_all {
            f64::MIN
        } else {
            self.config.similarity_threshold
        };
        self.similarity_store.similar_to(user_id, floor, limit).await
    }

    /// Recomputes similarity between one user and everyone sharing items
    /// with them, bounded by the candidate pool size
    ///
    /// Returns the number of persisted pairs plus descriptions of any
    /// pairs that were skipped after a failure; never raises for a single
    /// bad candidate.
    pub async fn compute_for_user(&self, user_id: Uuid) -> (usize, Vec<String>) {
        let candidates = match self
            .watch_store
            .users_sharing_items(user_id, self.config.candidate_pool_size)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                return (0, vec![format!("candidate discovery for {}: {}", user_id, e)]);
            }
        };

        let mut computed = 0;
        let mut errors = Vec::new();
        for candidate in candidates {
            match self.compute_pair(user_id, candidate).await {
                Ok(PairOutcome::Computed(_)) => computed += 1,
                Ok(PairOutcome::NotEnoughData { .. }) => {}
                Err(e) => {
                    tracing::warn!(user_a = %user_id, user_b = %candidate, error = %e, "Pair computation failed, skipping");
                    errors.push(format!("pair ({}, {}): {}", user_id, candidate, e));
                }
            }
        }
        (computed, errors)
    }

    /// Batch entry point: recomputes similarity for a page of users
    pub async fn compute_all(self: &Arc<Self>, page: BatchPage) -> AppResult<BatchReport> {
        let start = std::time::Instant::now();
        let users = self
            .watch_store
            .user_ids_page(page.limit, page.offset)
            .await?;
        let processed = users.len();

        tracing::info!(users = processed, offset = page.offset, "Similarity batch started");

        let results = run_chunked(
            users,
            self.config.batch_chunk_size,
            self.config.batch_chunk_delay_ms,
            |user_id| {
                let engine = Arc::clone(self);
                async move { engine.compute_for_user(user_id).await }
            },
        )
        .await;

        let mut computed = 0;
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok((pairs, pair_errors)) => {
                    computed += pairs;
                    errors.extend(pair_errors);
                }
                Err(panic) => errors.push(panic),
            }
        }

        tracing::info!(processed, computed, errors = errors.len(), "Similarity batch finished");

        Ok(BatchReport::new(
            processed,
            computed,
            errors,
            start.elapsed().as_millis() as u64,
            self.config.max_reported_errors,
        ))
    }
}

/// Ratings both users gave the same item
fn shared_ratings(a: &[WatchEntry], b: &[WatchEntry]) -> Vec<(f64, f64)> {
    let rated_b: HashMap<ItemKey, f64> = b
        .iter()
        .filter_map(|e| effective_rating(e).map(|r| (e.item, r)))
        .collect();

    let mut shared: Vec<(ItemKey, f64, f64)> = a
        .iter()
        .filter_map(|e| {
            let ra = effective_rating(e)?;
            let rb = rated_b.get(&e.item)?;
            Some((e.item, ra, *rb))
        })
        .collect();
    // Stable order keeps the correlation deterministic
    shared.sort_by(|x, y| x.0.cmp(&y.0));
    shared.into_iter().map(|(_, ra, rb)| (ra, rb)).collect()
}

fn effective_rating(entry: &WatchEntry) -> Option<f64> {
    entry.weighted_rating.or(entry.user_rating)
}

/// Builds the persisted score for a canonical pair
fn score_pair(
    pair: UserPair,
    history_a: &[WatchEntry],
    history_b: &[WatchEntry],
    shared: &[(f64, f64)],
    taste_a: &TasteMap,
    taste_b: &TasteMap,
) -> SimilarityScore {
    let rating_correlation = {
        let xs: Vec<f64> = shared.iter().map(|(a, _)| *a).collect();
        let ys: Vec<f64> = shared.iter().map(|(_, b)| *b).collect();
        pearson(&xs, &ys).unwrap_or(0.0)
    };

    let agreement = shared
        .iter()
        .filter(|(a, b)| (a - b).abs() <= AGREEMENT_TOLERANCE)
        .count() as f64
        / shared.len() as f64;

    // Fold correlation into shared-item agreement; correlation is mapped
    // from [-1, 1] into [0, 1] first
    let movie_score = 0.5 * agreement + 0.5 * ((rating_correlation + 1.0) / 2.0);

    let taste_similarity = cosine_similarity(&taste_a.genre_profile, &taste_b.genre_profile);

    let persons_a: HashSet<&String> = taste_a.person_profile.keys().collect();
    let persons_b: HashSet<&String> = taste_b.person_profile.keys().collect();
    let person_overlap = jaccard(&persons_a, &persons_b);

    let now = Utc::now();
    SimilarityScore {
        pair,
        overall_match: overall_match(movie_score, taste_similarity, person_overlap),
        taste_similarity,
        rating_correlation,
        person_overlap,
        snapshot_a: history_a.iter().filter(|e| effective_rating(e).is_some()).count() as u32,
        snapshot_b: history_b.iter().filter(|e| effective_rating(e).is_some()).count() as u32,
        computed_at: now,
        updated_at: now,
        computed_by: ENGINE_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryCache, MemoryMetadata, MemoryStore};
    use crate::models::MediaKind;

    fn item(id: i64) -> ItemKey {
        ItemKey::new(id, MediaKind::Movie)
    }

    fn engine_with(
        store: Arc<MemoryStore>,
        metadata: Arc<MemoryMetadata>,
    ) -> Arc<SimilarityEngine> {
        let taste_maps = Arc::new(TasteMapService::new(
            store.clone(),
            metadata,
            Arc::new(MemoryCache::new()),
            EngineConfig::default(),
        ));
        Arc::new(SimilarityEngine::new(
            store.clone(),
            store,
            taste_maps,
            EngineConfig::default(),
        ))
    }

    #[test]
    fn test_overall_match_worked_example() {
        // movie=0.75, taste=0.65, person=0.55 -> 0.68
        let combined = overall_match(0.75, 0.65, 0.55);
        assert!((combined - 0.68).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_perfect_and_inverse() {
        let up = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((up - 1.0).abs() < 1e-9);

        let down = pearson(&[1.0, 2.0, 3.0], &[6.0, 4.0, 2.0]).unwrap();
        assert!((down + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_degenerate_inputs() {
        assert_eq!(pearson(&[1.0], &[1.0]), None);
        assert_eq!(pearson(&[5.0, 5.0, 5.0], &[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn test_cosine_similarity_identical_profiles() {
        let mut profile = HashMap::new();
        profile.insert("Drama".to_string(), 0.7);
        profile.insert("Crime".to_string(), 0.3);
        assert!((cosine_similarity(&profile, &profile) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_disjoint_profiles() {
        let mut a = HashMap::new();
        a.insert("Drama".to_string(), 1.0);
        let mut b = HashMap::new();
        b.insert("Comedy".to_string(), 1.0);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &HashMap::new()), 0.0);
    }

    #[test]
    fn test_jaccard() {
        let a: HashSet<&str> = ["x", "y"].into_iter().collect();
        let b: HashSet<&str> = ["y", "z"].into_iter().collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard(&HashSet::<&str>::new(), &HashSet::new()), 0.0);
    }

    #[tokio::test]
    async fn test_no_shared_items_produces_no_row() {
        let store = Arc::new(MemoryStore::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.seed_watched(a, item(1), 8.0);
        store.seed_watched(b, item(2), 8.0);

        let engine = engine_with(store.clone(), Arc::new(MemoryMetadata::new()));
        let outcome = engine.compute_pair(a, b).await.unwrap();
        assert!(matches!(outcome, PairOutcome::NotEnoughData { .. }));

        let pair = UserPair::new(a, b).unwrap();
        assert!(store.get_pair(&pair).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_symmetry_and_single_row_per_pair() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for id in [1, 2, 3] {
            store.seed_watched(a, item(id), 8.0);
            store.seed_watched(b, item(id), 7.5);
            metadata.seed_genres(item(id), &["Drama"]);
        }

        let engine = engine_with(store.clone(), metadata);

        // Compute in both argument orders; the row must be identical
        let first = match engine.compute_pair(a, b).await.unwrap() {
            PairOutcome::Computed(score) => score,
            other => panic!("expected a computed pair, got {:?}", other),
        };
        let second = match engine.compute_pair(b, a).await.unwrap() {
            PairOutcome::Computed(score) => score,
            other => panic!("expected a computed pair, got {:?}", other),
        };

        assert_eq!(first.pair, second.pair);
        assert!((first.overall_match - second.overall_match).abs() < 1e-9);

        // Exactly one row, computed_at preserved across the re-upsert
        let stored = store
            .get_pair(&UserPair::new(b, a).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.computed_at, first.computed_at);
        assert!(stored.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_self_pair_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store, Arc::new(MemoryMetadata::new()));
        let user = Uuid::new_v4();
        let result = engine.compute_pair(user, user).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_agreeing_users_score_higher_than_disagreeing() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let target = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let foe = Uuid::new_v4();

        for (id, rating) in [(1, 9.0), (2, 3.0), (3, 7.0)] {
            store.seed_watched(target, item(id), rating);
            store.seed_watched(friend, item(id), rating);
            store.seed_watched(foe, item(id), 10.0 - rating + 1.0);
            metadata.seed_genres(item(id), &["Drama"]);
        }

        let engine = engine_with(store, metadata);
        let friendly = match engine.compute_pair(target, friend).await.unwrap() {
            PairOutcome::Computed(score) => score,
            other => panic!("expected a computed pair, got {:?}", other),
        };
        let hostile = match engine.compute_pair(target, foe).await.unwrap() {
            PairOutcome::Computed(score) => score,
            other => panic!("expected a computed pair, got {:?}", other),
        };

        assert!(friendly.overall_match > hostile.overall_match);
        assert!(friendly.rating_correlation > hostile.rating_correlation);
    }

    #[tokio::test]
    async fn test_compute_all_reports_counts() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for id in [1, 2] {
            store.seed_watched(a, item(id), 8.0);
            store.seed_watched(b, item(id), 8.0);
            metadata.seed_genres(item(id), &["Drama"]);
        }

        let engine = engine_with(store, metadata);
        let report = engine
            .compute_all(BatchPage { limit: 10, offset: 0 })
            .await
            .unwrap();

        assert_eq!(report.processed, 2);
        // Both users discover each other; the pair is upserted twice but
        // remains a single row
        assert_eq!(report.computed, 2);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_similar_users_threshold_gating() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        // Identical histories and tastes: well above any sane threshold
        for id in [1, 2, 3] {
            store.seed_watched(a, item(id), 8.0);
            store.seed_watched(b, item(id), 8.0);
            metadata.seed_genres(item(id), &["Drama"]);
        }

        let engine = engine_with(store, metadata);
        engine.compute_pair(a, b).await.unwrap();

        let matches = engine.similar_users(a, 10, false).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pair.other(a), Some(b));

        let all = engine.similar_users(a, 10, true).await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
