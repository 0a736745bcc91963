//! Random baseline
//!
//! Control algorithm: a random draw from the most-watched items the user
//! has not tracked. Exists so the personalized algorithms have something
//! to beat, and so brand-new users still get a non-empty session.

use std::collections::HashSet;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Candidate, ItemKey, RecommendationSession};
use crate::store::PopularItem;

use super::{
    normalize_scores, rank_and_truncate, AlgorithmContext, AlgorithmMetrics, AlgorithmOutput,
    RecommendationAlgorithm,
};

pub struct RandomBaseline;

fn popularity_score(item: &PopularItem) -> f64 {
    // Unrated items fall back to a neutral midpoint
    item.avg_rating.unwrap_or(5.0) * 10.0
}

#[async_trait]
impl RecommendationAlgorithm for RandomBaseline {
    fn name(&self) -> &'static str {
        "random_baseline"
    }

    // Works for brand-new users too
    fn min_user_history(&self) -> usize {
        0
    }

    async fn generate(
        &self,
        user_id: Uuid,
        ctx: &AlgorithmContext,
        session: &RecommendationSession,
    ) -> AppResult<AlgorithmOutput> {
        let history = ctx.store.watch_history(user_id).await?;
        let own_items: HashSet<ItemKey> = history.iter().map(|e| e.item).collect();

        let pool: Vec<PopularItem> = ctx
            .store
            .popular_items(ctx.config.baseline_pool_size)
            .await?
            .into_iter()
            .filter(|p| !own_items.contains(&p.item))
            .collect();
        // Pool counts candidates before the cooldown filter, like the
        // twin algorithms do
        let pool_size = pool.len();

        let drawable: Vec<&PopularItem> = pool
            .iter()
            .filter(|p| !session.previously_seen.contains(&p.item))
            .collect();
        let picked: Vec<Candidate> = drawable
            .choose_multiple(&mut rand::thread_rng(), ctx.config.per_algorithm_limit)
            .map(|p| Candidate::new(p.item, popularity_score(p), self.name()))
            .collect();

        let mut candidates = picked;
        normalize_scores(&mut candidates);
        rank_and_truncate(&mut candidates, ctx.config.per_algorithm_limit);

        Ok(AlgorithmOutput {
            recommendations: candidates,
            metrics: AlgorithmMetrics {
                candidates_pool_size: pool_size,
                twins_considered: 0,
                duration_ms: 0,
            },
        })
    }
}
