//! Want-list overlap
//!
//! Two users planning to watch the same things probably want the same
//! kinds of things. Twins are found by Jaccard overlap of want lists;
//! a twin's remaining want-list items become candidates, scored by how
//! many overlapping twins want them.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Candidate, ItemKey, RecommendationSession, WatchStatus};
use crate::services::similarity::jaccard;

use super::{
    filter_cooldown, normalize_scores, rank_and_truncate, AlgorithmContext, AlgorithmMetrics,
    AlgorithmOutput, RecommendationAlgorithm,
};

pub struct WantOverlap;

#[async_trait]
impl RecommendationAlgorithm for WantOverlap {
    fn name(&self) -> &'static str {
        "want_overlap"
    }

    fn min_user_history(&self) -> usize {
        1
    }

    async fn generate(
        &self,
        user_id: Uuid,
        ctx: &AlgorithmContext,
        session: &RecommendationSession,
    ) -> AppResult<AlgorithmOutput> {
        let history = ctx.store.watch_history(user_id).await?;
        let own_items: HashSet<ItemKey> = history.iter().map(|e| e.item).collect();
        let own_wants: HashSet<ItemKey> = history
            .iter()
            .filter(|e| e.status == WatchStatus::Want)
            .map(|e| e.item)
            .collect();
        if own_wants.is_empty() {
            return Ok(AlgorithmOutput::empty());
        }

        // Sharers are already ordered by co-occurrence, a cheap pre-filter
        let sharers = ctx
            .store
            .users_sharing_items(user_id, ctx.config.twin_sample_size)
            .await?;

        let mut twins_considered = 0;
        let mut scores: HashMap<ItemKey, f64> = HashMap::new();

        for twin_id in sharers {
            let twin_history = ctx.store.watch_history(twin_id).await?;
            let twin_wants: HashSet<ItemKey> = twin_history
                .iter()
                .filter(|e| e.status == WatchStatus::Want)
                .map(|e| e.item)
                .collect();

            let overlap = jaccard(&own_wants, &twin_wants);
            if overlap < ctx.config.want_overlap_floor {
                continue;
            }
            twins_considered += 1;

            for item in twin_wants {
                if own_items.contains(&item) {
                    continue;
                }
                // Accumulate: an item wanted by many twins climbs the pile
                *scores.entry(item).or_insert(0.0) += overlap;
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

    fn context(store: Arc<MemoryStore>) -> AlgorithmContext {
        let metadata = Arc::new(MemoryMetadata::new());
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
    async fn test_no_want_list_means_no_candidates() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.seed_watched(user, movie(1), 8.0);

        let ctx = context(store);
        let output = WantOverlap.execute(user, &ctx, &session()).await;
        assert!(output.recommendations.is_empty());
        assert_eq!(output.metrics.candidates_pool_size, 0);
    }

    #[tokio::test]
    async fn test_overlapping_want_lists_trade_items() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();

        for id in [1, 2, 3] {
            store.seed_status(user, movie(id), WatchStatus::Want);
            store.seed_status(twin, movie(id), WatchStatus::Want);
        }
        store.seed_status(twin, movie(4), WatchStatus::Want);

        let ctx = context(store);
        let output = WantOverlap.execute(user, &ctx, &session()).await;
        assert_eq!(output.metrics.twins_considered, 1);
        assert_eq!(output.recommendations.len(), 1);
        assert_eq!(output.recommendations[0].item, movie(4));
    }

    #[tokio::test]
    async fn test_thin_overlap_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        // One shared want out of eleven distinct items, under the floor
        store.seed_status(user, movie(1), WatchStatus::Want);
        store.seed_status(other, movie(1), WatchStatus::Want);
        for id in 2..12 {
            store.seed_status(other, movie(id), WatchStatus::Want);
        }

        let ctx = context(store);
        let output = WantOverlap.execute(user, &ctx, &session()).await;
        assert_eq!(output.metrics.twins_considered, 0);
        assert!(output.recommendations.is_empty());
    }
}
