//! Type-affinity twins
//!
//! Recommends items favored by users whose media-kind mix (movie vs tv
//! vs anime) looks like the target user's. The twin pool comes from a
//! bounded random sample of active users, never an exhaustive scan.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Candidate, ItemKey, MediaKind, RecommendationSession, WatchEntry};

use super::{
    distribution, effective_rating, filter_cooldown, normalize_scores, popularity_factor,
    rank_and_truncate, vector_similarity, AlgorithmContext, AlgorithmMetrics, AlgorithmOutput,
    RecommendationAlgorithm,
};

/// Best twin signal seen so far for one candidate item
struct TwinSignal {
    score: f64,
    twin_rating: f64,
    similarity: f64,
}

pub struct TypeAffinityTwins;

fn kind_distribution(entries: &[WatchEntry]) -> HashMap<MediaKind, f64> {
    let mut counts: HashMap<MediaKind, usize> = HashMap::new();
    for entry in entries.iter().filter(|e| e.status.is_watched()) {
        *counts.entry(entry.item.media_kind).or_insert(0) += 1;
    }
    distribution(&counts)
}

#[async_trait]
impl RecommendationAlgorithm for TypeAffinityTwins {
    fn name(&self) -> &'static str {
        "type_affinity_twins"
    }

    // Exactly 3 watched items is enough to proceed
    fn min_user_history(&self) -> usize {
        3
    }

    async fn generate(
        &self,
        user_id: Uuid,
        ctx: &AlgorithmContext,
        session: &RecommendationSession,
    ) -> AppResult<AlgorithmOutput> {
        let history = ctx.store.watch_history(user_id).await?;
        let watched_count = history.iter().filter(|e| e.status.is_watched()).count();
        if watched_count < self.min_user_history() {
            return Ok(AlgorithmOutput::empty());
        }

        let own_items: std::collections::HashSet<ItemKey> =
            history.iter().map(|e| e.item).collect();
        let own_distribution = kind_distribution(&history);

        // Clear-majority kind, if any; its candidates get a boost later
        let dominant_kind = own_distribution
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .filter(|(_, share)| **share > ctx.config.dominant_kind_threshold)
            .map(|(kind, _)| *kind);

        let sample = ctx
            .store
            .sample_active_users(user_id, ctx.config.twin_sample_size)
            .await?;

        let mut twins_considered = 0;
        let mut scores: HashMap<ItemKey, TwinSignal> = HashMap::new();

        for twin_id in sample {
            let twin_history = ctx.store.watch_history(twin_id).await?;
            let twin_distribution = kind_distribution(&twin_history);
            if twin_distribution.is_empty() {
                continue;
            }

            let similarity = vector_similarity(&own_distribution, &twin_distribution);
            if similarity < ctx.config.twin_similarity_floor {
                continue;
            }
            twins_considered += 1;

            for entry in twin_history.iter().filter(|e| e.status.is_watched()) {
                if own_items.contains(&entry.item) {
                    continue;
                }
                let Some(rating) = effective_rating(entry) else {
                    continue;
                };
                if rating < ctx.config.twin_rating_floor {
                    continue;
                }

                let mut score = rating * 10.0 * similarity;
                if dominant_kind == Some(entry.item.media_kind) {
                    score *= ctx.config.dominant_kind_bonus;
                }

                // Same item from several twins keeps its best score
                let slot = scores.entry(entry.item).or_insert(TwinSignal {
                    score: 0.0,
                    twin_rating: rating,
                    similarity,
                });
                if score > slot.score {
                    *slot = TwinSignal {
                        score,
                        twin_rating: rating,
                        similarity,
                    };
                }
            }
        }

        let pool_size = scores.len();
        let mut candidates = Vec::with_capacity(pool_size);
        for (item, signal) in scores {
            // Vote volume breaks ties between equally rated twin items;
            // a failed lookup degrades to a neutral factor
            let details = match ctx.metadata.fetch_details(&item).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!(item = %item, error = %e, "Metadata lookup failed");
                    None
                }
            };
            let vote_count = details.as_ref().and_then(|d| d.vote_count);
            let mut candidate = Candidate::new(
                item,
                signal.score * popularity_factor(details.as_ref()),
                self.name(),
            );
            candidate.metadata = Some(serde_json::json!({
                "twin_rating": signal.twin_rating,
                "twin_similarity": signal.similarity,
                "vote_count": vote_count,
            }));
            candidates.push(candidate);
        }

        let mut candidates = filter_cooldown(candidates, &session.previously_seen);
        normalize_scores(&mut candidates);
        rank_and_truncate(&mut candidates, ctx.config.per_algorithm_limit);

        Ok(AlgorithmOutput {
            recommendations: candidates,
            metrics: AlgorithmMetrics {
                candidates_pool_size: pool_size,
                twins_considered,
                duration_ms: 0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::memory::{MemoryCache, MemoryMetadata, MemoryStore};
    use crate::services::taste_map::TasteMapService;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn movie(id: i64) -> ItemKey {
        ItemKey::new(id, MediaKind::Movie)
    }

    fn anime(id: i64) -> ItemKey {
        ItemKey::new(id, MediaKind::Anime)
    }

    fn context(store: Arc<MemoryStore>) -> AlgorithmContext {
        let metadata = Arc::new(MemoryMetadata::new());
        let cache = Arc::new(MemoryCache::new());
        let config = EngineConfig::default();
        let taste_maps = Arc::new(TasteMapService::new(
            store.clone(),
            metadata.clone(),
            cache,
            config.clone(),
        ));
        AlgorithmContext {
            store,
            metadata,
            taste_maps,
            config,
        }
    }

    fn session() -> RecommendationSession {
        RecommendationSession::new(HashSet::new(), 20)
    }

    #[tokio::test]
    async fn test_cold_start_returns_empty_with_zero_pool() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.seed_watched(user, movie(1), 8.0);
        store.seed_watched(user, movie(2), 8.0);

        let ctx = context(store);
        let output = TypeAffinityTwins
            .execute(user, &ctx, &session())
            .await;
        assert!(output.recommendations.is_empty());
        assert_eq!(output.metrics.candidates_pool_size, 0);
    }

    #[tokio::test]
    async fn test_exactly_three_watched_is_enough() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();
        for id in [1, 2, 3] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(twin, movie(id), 8.0);
        }
        store.seed_watched(twin, movie(4), 9.0);

        let ctx = context(store);
        let output = TypeAffinityTwins.execute(user, &ctx, &session()).await;
        assert_eq!(output.metrics.twins_considered, 1);
        assert_eq!(output.recommendations.len(), 1);
        assert_eq!(output.recommendations[0].item, movie(4));
    }

    #[tokio::test]
    async fn test_dissimilar_users_are_not_twins() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let anime_fan = Uuid::new_v4();
        for id in [1, 2, 3] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(anime_fan, anime(id), 9.0);
        }

        let ctx = context(store);
        let output = TypeAffinityTwins.execute(user, &ctx, &session()).await;
        assert_eq!(output.metrics.twins_considered, 0);
        assert!(output.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_low_rated_twin_items_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();
        for id in [1, 2, 3] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(twin, movie(id), 8.0);
        }
        store.seed_watched(twin, movie(4), 5.0);

        let ctx = context(store);
        let output = TypeAffinityTwins.execute(user, &ctx, &session()).await;
        assert!(output.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_dominant_kind_bonus_reorders_candidates() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();
        // User is movie-dominant; twin mirrors the mix closely enough
        for id in [1, 2, 3, 4] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(twin, movie(id), 8.0);
        }
        store.seed_watched(user, anime(1), 8.0);
        store.seed_watched(twin, anime(1), 8.0);
        // Equal twin ratings; only the bonus separates them
        store.seed_watched(twin, movie(50), 9.0);
        store.seed_watched(twin, anime(50), 9.0);

        let ctx = context(store);
        let output = TypeAffinityTwins.execute(user, &ctx, &session()).await;
        assert_eq!(output.recommendations.len(), 2);
        assert_eq!(output.recommendations[0].item, movie(50));
        assert_eq!(output.recommendations[0].score, 100.0);
        assert!(output.recommendations[1].score < 100.0);
    }

    #[tokio::test]
    async fn test_vote_volume_separates_equal_twin_ratings() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();
        for id in [1, 2, 3] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(twin, movie(id), 8.0);
        }
        // Same twin rating; only catalog vote volume differs
        store.seed_watched(twin, movie(4), 9.0);
        store.seed_watched(twin, movie(5), 9.0);

        let metadata = Arc::new(MemoryMetadata::new());
        metadata.insert(
            movie(4),
            crate::models::ItemMetadata {
                vote_count: Some(10),
                ..Default::default()
            },
        );
        metadata.insert(
            movie(5),
            crate::models::ItemMetadata {
                vote_count: Some(50_000),
                ..Default::default()
            },
        );

        let config = EngineConfig::default();
        let taste_maps = Arc::new(TasteMapService::new(
            store.clone(),
            metadata.clone(),
            Arc::new(MemoryCache::new()),
            config.clone(),
        ));
        let ctx = AlgorithmContext {
            store,
            metadata,
            taste_maps,
            config,
        };

        let output = TypeAffinityTwins.execute(user, &ctx, &session()).await;
        assert_eq!(output.recommendations.len(), 2);
        assert_eq!(output.recommendations[0].item, movie(5));
        assert_eq!(output.recommendations[0].score, 100.0);
        assert!(output.recommendations[1].score < 100.0);
    }

    #[tokio::test]
    async fn test_candidates_carry_twin_context() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();
        for id in [1, 2, 3] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(twin, movie(id), 8.0);
        }
        store.seed_watched(twin, movie(4), 9.0);

        let ctx = context(store);
        let output = TypeAffinityTwins.execute(user, &ctx, &session()).await;
        assert_eq!(output.recommendations.len(), 1);
        let context_json = output.recommendations[0]
            .metadata
            .as_ref()
            .expect("twin candidates carry context");
        assert_eq!(context_json["twin_rating"], 9.0);
        assert!(context_json["twin_similarity"].as_f64().unwrap() > 0.9);
    }

    #[tokio::test]
    async fn test_cooldown_items_never_surface() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();
        for id in [1, 2, 3] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(twin, movie(id), 8.0);
        }
        store.seed_watched(twin, movie(4), 9.0);

        let ctx = context(store);
        let seen: HashSet<ItemKey> = [movie(4)].into_iter().collect();
        let session = RecommendationSession::new(seen, 20);
        let output = TypeAffinityTwins.execute(user, &ctx, &session).await;
        // Pool counts the candidate; the filter removes it from the output
        assert_eq!(output.metrics.candidates_pool_size, 1);
        assert!(output.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_scores_normalized_to_bounds() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();
        for id in [1, 2, 3] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(twin, movie(id), 8.0);
        }
        store.seed_watched(twin, movie(4), 10.0);
        store.seed_watched(twin, movie(5), 7.5);

        let ctx = context(store);
        let output = TypeAffinityTwins.execute(user, &ctx, &session()).await;
        assert!(!output.recommendations.is_empty());
        assert!(output
            .recommendations
            .iter()
            .all(|c| (0.0..=100.0).contains(&c.score)));
    }
}
