//! Candidate scorer and deduplicator
//!
//! Merges per-algorithm candidate lists for one session into a single
//! ranked result. Dedup keeps the best score per item while remembering
//! every contributing algorithm; the session cooldown set is applied here
//! again even though each algorithm already filters it.

use std::collections::HashMap;

use crate::models::{Candidate, ItemKey, RankedRecommendation, RecommendationSession};

struct MergedEntry {
    score: f64,
    sources: Vec<String>,
    /// Registry index of the best-scoring proposer, for tie-breaking
    priority: usize,
}

/// Merges algorithm outputs into one ranked, deduplicated list
///
/// `outputs` must be in registry order; that order is the priority used
/// to break score ties. Every returned score lies within [0, 100] and no
/// item from the session's cooldown set survives.
pub fn merge_candidates(
    outputs: &[(String, Vec<Candidate>)],
    session: &RecommendationSession,
) -> Vec<RankedRecommendation> {
    let mut merged: HashMap<ItemKey, MergedEntry> = HashMap::new();

    for (priority, (name, candidates)) in outputs.iter().enumerate() {
        for candidate in candidates {
            if session.previously_seen.contains(&candidate.item) {
                continue;
            }
            let score = candidate.score.clamp(0.0, 100.0);

            match merged.entry(candidate.item) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(MergedEntry {
                        score,
                        sources: vec![name.clone()],
                        priority,
                    });
                }
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    let entry = slot.get_mut();
                    if !entry.sources.contains(name) {
                        entry.sources.push(name.clone());
                    }
                    if score > entry.score {
                        entry.score = score;
                        entry.priority = priority;
                    }
                }
            }
        }
    }

    let mut ranked: Vec<(ItemKey, MergedEntry)> = merged.into_iter().collect();
    ranked.sort_by(|(item_a, a), (item_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.priority.cmp(&b.priority))
            .then(item_a.cmp(item_b))
    });
    ranked.truncate(session.requested);

    ranked
        .into_iter()
        .map(|(item, entry)| RankedRecommendation {
            item,
            score: entry.score,
            sources: entry.sources,
        })
        .collect()
}
