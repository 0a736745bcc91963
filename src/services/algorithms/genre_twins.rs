//! Genre twins
//!
//! Like taste match but with a stricter distance: twins must have a low
//! mean absolute difference across the union of genre fractions, which
//! penalizes a twin for genres the user never touches. Cosine similarity
//! (taste match) only rewards shared mass.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Candidate, ItemKey, RecommendationSession};

use super::{
    effective_rating, filter_cooldown, normalize_scores, rank_and_truncate, vector_similarity,
    AlgorithmContext, AlgorithmMetrics, AlgorithmOutput, RecommendationAlgorithm,
};

pub struct GenreTwins;

#[async_trait]
impl RecommendationAlgorithm for GenreTwins {
    fn name(&self) -> &'static str {
        "genre_twins"
    }

    fn min_user_history(&self) -> usize {
        3
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
            let similarity = vector_similarity(&own_map.genre_profile, &twin_map.genre_profile);
            if similarity < ctx.config.twin_similarity_floor {
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
