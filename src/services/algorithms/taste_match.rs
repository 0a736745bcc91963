//! Taste match
//!
//! Finds twins by cosine similarity of normalized genre profiles, then
//! proposes the twins' highly rated items. Users without a classified
//! taste map contribute nothing in either direction.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Candidate, ItemKey, RecommendationSession};
use crate::services::similarity::cosine_similarity;

use super::{
    effective_rating, filter_cooldown, normalize_scores, rank_and_truncate, AlgorithmContext,
    AlgorithmMetrics, AlgorithmOutput, RecommendationAlgorithm,
};

pub struct TasteMatch;

#[async_trait]
impl RecommendationAlgorithm for TasteMatch {
    fn name(&self) -> &'static str {
        "taste_match"
    }

    fn min_user_history(&self) -> usize {
        5
    }

    async fn generate(
        &self,
        user_id: Uuid,
        ctx: &AlgorithmContext,
        session: &RecommendationSession,
    ) -> AppResult<AlgorithmOutput> {
        let own_map = ctx.taste_maps.taste_map(user_id).await?;
        if own_map.is_empty() {
            return Ok(AlgorithmOutput::empty());
        }

        let history = ctx.store.watch_history(user_id).await?;
        let own_items: HashSet<ItemKey> = history.iter().map(|e| e.item).collect();

        let sample = ctx
            .store
            .sample_active_users(user_id, ctx.config.twin_sample_size)
            .await?;

        let mut twins_considered = 0;
        let mut scores: HashMap<ItemKey, f64> = HashMap::new();

        for twin_id in sample {
            let twin_map = ctx.taste_maps.taste_map(twin_id).await?;
            if twin_map.is_empty() {
                continue;
            }
            let similarity = cosine_similarity(&own_map.genre_profile, &twin_map.genre_profile);
            if similarity < ctx.config.taste_similarity_floor {
                continue;
            }
            twins_considered += 1;

            let twin_history = ctx.store.watch_history(twin_id).await?;
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
                let score = rating * 10.0 * similarity;
                let slot = scores.entry(entry.item).or_insert(0.0);
                if score > *slot {
                    *slot = score;
                }
            }
        }

        let pool_size = scores.len();
        let candidates: Vec<Candidate> = scores
            .into_iter()
            .map(|(item, score)| Candidate::new(item, score, self.name()))
            .collect();

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
    use crate::models::MediaKind;
    use crate::services::taste_map::TasteMapService;
    use std::sync::Arc;

    fn movie(id: i64) -> ItemKey {
        ItemKey::new(id, MediaKind::Movie)
    }

    fn context(store: Arc<MemoryStore>, metadata: Arc<MemoryMetadata>) -> AlgorithmContext {
        let config = EngineConfig::default();
        let taste_maps = Arc::new(TasteMapService::new(
            store.clone(),
            metadata.clone(),
            Arc::new(MemoryCache::new()),
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
    async fn test_unclassified_user_gets_nothing() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.seed_watched(user, movie(1), 8.0);

        // No genre metadata at all, so the taste map is empty
        let ctx = context(store, Arc::new(MemoryMetadata::new()));
        let output = TasteMatch.execute(user, &ctx, &session()).await;
        assert!(output.recommendations.is_empty());
        assert_eq!(output.metrics.candidates_pool_size, 0);
    }

    #[tokio::test]
    async fn test_genre_twin_items_surface() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();

        for id in [1, 2] {
            store.seed_watched(user, movie(id), 8.0);
            store.seed_watched(twin, movie(id), 8.0);
            metadata.seed_genres(movie(id), &["Drama"]);
        }
        store.seed_watched(twin, movie(3), 9.0);
        metadata.seed_genres(movie(3), &["Drama"]);

        let ctx = context(store, metadata);
        let output = TasteMatch.execute(user, &ctx, &session()).await;
        assert_eq!(output.metrics.twins_considered, 1);
        assert_eq!(output.recommendations.len(), 1);
        assert_eq!(output.recommendations[0].item, movie(3));
    }

    #[tokio::test]
    async fn test_opposite_tastes_are_not_twins() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        store.seed_watched(user, movie(1), 8.0);
        metadata.seed_genres(movie(1), &["Drama"]);
        store.seed_watched(other, movie(2), 9.0);
        metadata.seed_genres(movie(2), &["Horror"]);

        let ctx = context(store, metadata);
        let output = TasteMatch.execute(user, &ctx, &session()).await;
        assert_eq!(output.metrics.twins_considered, 0);
        assert!(output.recommendations.is_empty());
    }
}
