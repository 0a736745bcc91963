//! Drop pattern
//!
//! Users who abandon the same items tend to share blind spots and, by
//! extension, tastes. Twins are found by Jaccard overlap of dropped-item
//! sets; what those twins finished and rated highly becomes a candidate.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Candidate, ItemKey, RecommendationSession, WatchStatus};
use crate::services::similarity::jaccard;

use super::{
    effective_rating, filter_cooldown, normalize_scores, rank_and_truncate, AlgorithmContext,
    AlgorithmMetrics, AlgorithmOutput, RecommendationAlgorithm,
};

pub struct DropPattern;

fn dropped_items(history: &[crate::models::WatchEntry]) -> HashSet<ItemKey> {
    history
        .iter()
        .filter(|e| e.status == WatchStatus::Dropped)
        .map(|e| e.item)
        .collect()
}

#[async_trait]
impl RecommendationAlgorithm for DropPattern {
    fn name(&self) -> &'static str {
        "drop_pattern"
    }

    fn min_user_history(&self) -> usize {
        2
    }

    async fn generate(
        &self,
        user_id: Uuid,
        ctx: &AlgorithmContext,
        session: &RecommendationSession,
    ) -> AppResult<AlgorithmOutput> {
        let history = ctx.store.watch_history(user_id).await?;
        let own_items: HashSet<ItemKey> = history.iter().map(|e| e.item).collect();
        let own_drops = dropped_items(&history);
        if own_drops.len() < 2 {
            return Ok(AlgorithmOutput::empty());
        }

        let sharers = ctx
            .store
            .users_sharing_items(user_id, ctx.config.twin_sample_size)
            .await?;

        let mut twins_considered = 0;
        let mut scores: HashMap<ItemKey, f64> = HashMap::new();

        for twin_id in sharers {
            let twin_history = ctx.store.watch_history(twin_id).await?;
            let twin_drops = dropped_items(&twin_history);

            let overlap = jaccard(&own_drops, &twin_drops);
            if overlap < ctx.config.want_overlap_floor {
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
