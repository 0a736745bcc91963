//! Recommendation algorithm contract and registry
//!
//! Every algorithm is a named unit with a minimum-history gate and one
//! entry point. Orchestration calls each algorithm independently; a
//! failure inside one algorithm is contained here and never reaches the
//! caller or its siblings.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::AppResult;
use crate::models::{Candidate, ItemKey, RecommendationSession};
use crate::services::providers::MetadataProvider;
use crate::services::taste_map::TasteMapService;
use crate::store::WatchStore;

pub mod drop_pattern;
pub mod genre_twins;
pub mod person_twins;
pub mod random_baseline;
pub mod taste_match;
pub mod type_affinity;
pub mod want_overlap;

pub use drop_pattern::DropPattern;
pub use genre_twins::GenreTwins;
pub use person_twins::PersonTwins;
pub use random_baseline::RandomBaseline;
pub use taste_match::TasteMatch;
pub use type_affinity::TypeAffinityTwins;
pub use want_overlap::WantOverlap;

/// Shared collaborators handed to every algorithm
#[derive(Clone)]
pub struct AlgorithmContext {
    pub store: Arc<dyn WatchStore>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub taste_maps: Arc<TasteMapService>,
    pub config: EngineConfig,
}

/// Per-run observability counters
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AlgorithmMetrics {
    /// Raw candidates considered before truncation
    pub candidates_pool_size: usize,
    /// Twin users that passed the similarity floor
    pub twins_considered: usize,
    pub duration_ms: u64,
}

/// What one algorithm hands to the scorer
#[derive(Debug, Clone, Default)]
pub struct AlgorithmOutput {
    pub recommendations: Vec<Candidate>,
    pub metrics: AlgorithmMetrics,
}

impl AlgorithmOutput {
    /// The contained-failure and cold-start result
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait RecommendationAlgorithm: Send + Sync {
    /// Stable name used in candidate attribution and logs
    fn name(&self) -> &'static str;

    /// Watch-list size below which the orchestrator skips this algorithm
    /// without invoking it
    fn min_user_history(&self) -> usize;

    /// Produces scored candidates; may fail
    async fn generate(
        &self,
        user_id: Uuid,
        ctx: &AlgorithmContext,
        session: &RecommendationSession,
    ) -> AppResult<AlgorithmOutput>;

    /// Runs the algorithm with failure containment
    ///
    /// Any error becomes an empty result with a zero pool size; it is
    /// logged and never propagated.
    async fn execute(
        &self,
        user_id: Uuid,
        ctx: &AlgorithmContext,
        session: &RecommendationSession,
    ) -> AlgorithmOutput {
        let start = Instant::now();
        match self.generate(user_id, ctx, session).await {
            Ok(mut output) => {
                output.metrics.duration_ms = start.elapsed().as_millis() as u64;
                output
            }
            Err(e) => {
                tracing::warn!(
                    algorithm = self.name(),
                    user_id = %user_id,
                    error = %e,
                    "Algorithm failed, returning empty result"
                );
                AlgorithmOutput::empty()
            }
        }
    }
}

/// Ordered set of registered algorithms
///
/// Registration order doubles as priority during merge tie-breaks.
#[derive(Default)]
pub struct AlgorithmRegistry {
    algorithms: Vec<Arc<dyn RecommendationAlgorithm>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, algorithm: Arc<dyn RecommendationAlgorithm>) {
        self.algorithms.push(algorithm);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RecommendationAlgorithm>> {
        self.algorithms.iter()
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    /// The full production set, in priority order
    pub fn default_set() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TypeAffinityTwins));
        registry.register(Arc::new(TasteMatch));
        registry.register(Arc::new(GenreTwins));
        registry.register(Arc::new(PersonTwins));
        registry.register(Arc::new(WantOverlap));
        registry.register(Arc::new(DropPattern));
        registry.register(Arc::new(RandomBaseline));
        registry
    }
}

/// Percentage-of-total distribution over counted keys
pub(crate) fn distribution<K: std::hash::Hash + Eq + Copy>(
    counts: &HashMap<K, usize>,
) -> HashMap<K, f64> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return HashMap::new();
    }
    counts
        .iter()
        .map(|(k, v)| (*k, *v as f64 / total as f64))
        .collect()
}

/// 1 minus the mean absolute difference between two fraction vectors,
/// taken over the union of their keys
pub(crate) fn vector_similarity<K: std::hash::Hash + Eq>(
    a: &HashMap<K, f64>,
    b: &HashMap<K, f64>,
) -> f64 {
    let keys: HashSet<&K> = a.keys().chain(b.keys()).collect();
    if keys.is_empty() {
        return 0.0;
    }
    let total_diff: f64 = keys
        .iter()
        .map(|k| {
            let va = a.get(*k).copied().unwrap_or(0.0);
            let vb = b.get(*k).copied().unwrap_or(0.0);
            (va - vb).abs()
        })
        .sum();
    (1.0 - total_diff / keys.len() as f64).max(0.0)
}

/// Best available rating for a watch entry
pub(crate) fn effective_rating(entry: &crate::models::WatchEntry) -> Option<f64> {
    entry.weighted_rating.or(entry.user_rating)
}

/// Log-scaled score multiplier from catalog vote volume
///
/// Items the catalog does not know stay neutral, so a metadata outage
/// never zeroes a candidate.
pub(crate) fn popularity_factor(metadata: Option<&crate::models::ItemMetadata>) -> f64 {
    let votes = metadata.and_then(|m| m.vote_count).unwrap_or(0);
    1.0 + (votes as f64).ln_1p() / 10.0
}

/// Drops candidates the user has already seen within the cooldown window
pub(crate) fn filter_cooldown(
    candidates: Vec<Candidate>,
    seen: &HashSet<ItemKey>,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| !seen.contains(&c.item))
        .collect()
}

/// Min-max normalizes candidate scores onto [0, 100], in place
///
/// A flat candidate set (max == min) maps every score to 100.
pub(crate) fn normalize_scores(candidates: &mut [Candidate]) {
    let Some(max) = candidates
        .iter()
        .map(|c| c.score)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    else {
        return;
    };
    let min = candidates
        .iter()
        .map(|c| c.score)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(max);

    let range = max - min;
    for candidate in candidates.iter_mut() {
        candidate.score = if range == 0.0 {
            100.0
        } else {
            (candidate.score - min) / range * 100.0
        };
    }
}

/// Sorts by score descending (item id as tie-break) and truncates
pub(crate) fn rank_and_truncate(candidates: &mut Vec<Candidate>, limit: usize) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.item.cmp(&b.item))
    });
    candidates.truncate(limit);
}
