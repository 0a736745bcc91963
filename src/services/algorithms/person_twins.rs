//! Person twins
//!
//! Matches users by the overlap of their favored-person profiles (cast
//! members accumulated by the taste map builder). A twin's highly rated
//! items featuring anyone become candidates; the assumption is that a
//! shared actor following signals broader shared taste.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Candidate, ItemKey, RecommendationSession};
use crate::services::similarity::jaccard;

use super::{
    effective_rating, filter_cooldown, normalize_scores, rank_and_truncate, AlgorithmContext,
    AlgorithmMetrics, AlgorithmOutput, RecommendationAlgorithm,
};

pub struct PersonTwins;

#[async_trait]
impl RecommendationAlgorithm for PersonTwins {
    fn name(&self) -> &'static str {
        "person_twins"
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
        let own_people: HashSet<String> = own_map.person_profile.keys().cloned().collect();
        if own_people.is_empty() {
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
            let twin_people: HashSet<String> = twin_map.person_profile.keys().cloned().collect();

            let overlap = jaccard(&own_people, &twin_people);
            if overlap < ctx.config.person_overlap_floor {
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
                let score = rating * 10.0 * overlap;
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
    use crate::models::{ItemMetadata, MediaKind};
    use crate::services::taste_map::TasteMapService;
    use std::sync::Arc;

    fn movie(id: i64) -> ItemKey {
        ItemKey::new(id, MediaKind::Movie)
    }

    fn with_cast(genres: &[&str], cast: &[&str]) -> ItemMetadata {
        ItemMetadata {
            genres: genres.iter().map(|g| g.to_string()).collect(),
            cast: cast.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
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
    async fn test_no_person_profile_means_no_candidates() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let user = Uuid::new_v4();
        store.seed_watched(user, movie(1), 8.0);
        // Genres only, no cast, so the person profile stays empty
        metadata.seed_genres(movie(1), &["Drama"]);

        let ctx = context(store, metadata);
        let output = PersonTwins.execute(user, &ctx, &session()).await;
        assert!(output.recommendations.is_empty());
        assert_eq!(output.metrics.candidates_pool_size, 0);
    }

    #[tokio::test]
    async fn test_shared_cast_following_surfaces_twin_items() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let user = Uuid::new_v4();
        let twin = Uuid::new_v4();

        metadata.insert(movie(1), with_cast(&["Drama"], &["Toni Collette"]));
        metadata.insert(movie(2), with_cast(&["Drama"], &["Toni Collette"]));
        metadata.insert(movie(3), with_cast(&["Horror"], &["Toni Collette"]));

        store.seed_watched(user, movie(1), 9.0);
        store.seed_watched(twin, movie(2), 9.0);
        store.seed_watched(twin, movie(3), 8.5);

        let ctx = context(store, metadata);
        let output = PersonTwins.execute(user, &ctx, &session()).await;
        assert_eq!(output.metrics.twins_considered, 1);
        let items: Vec<ItemKey> = output.recommendations.iter().map(|c| c.item).collect();
        assert!(items.contains(&movie(2)));
        assert!(items.contains(&movie(3)));
    }

    #[tokio::test]
    async fn test_disjoint_person_profiles_are_not_twins() {
        let store = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        metadata.insert(movie(1), with_cast(&["Drama"], &["Toni Collette"]));
        metadata.insert(movie(2), with_cast(&["Action"], &["Keanu Reeves"]));

        store.seed_watched(user, movie(1), 9.0);
        store.seed_watched(other, movie(2), 9.0);

        let ctx = context(store, metadata);
        let output = PersonTwins.execute(user, &ctx, &session()).await;
        assert_eq!(output.metrics.twins_considered, 0);
        assert!(output.recommendations.is_empty());
    }
}
