use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ItemKey;

/// A scored item proposed by a single algorithm (transient)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub item: ItemKey,
    /// Raw score while an algorithm is working; normalized to [0, 100]
    /// before the candidate leaves the algorithm
    pub score: f64,
    pub source_algorithm: String,
    /// Free-form per-candidate context (twin rating, overlap size, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Candidate {
    pub fn new(item: ItemKey, score: f64, source_algorithm: impl Into<String>) -> Self {
        Self {
            item,
            score,
            source_algorithm: source_algorithm.into(),
            metadata: None,
        }
    }
}

/// One merged, ranked entry returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedRecommendation {
    pub item: ItemKey,
    /// Final score, guaranteed within [0, 100]
    pub score: f64,
    /// Names of every algorithm that proposed this item
    pub sources: Vec<String>,
}

/// Per-request recommendation state, discarded after the response
#[derive(Debug, Clone)]
pub struct RecommendationSession {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Items shown to this user within the cooldown window; nothing in
    /// this set may appear in the session's output
    pub previously_seen: HashSet<ItemKey>,
    /// Result size the caller asked for
    pub requested: usize,
}

impl RecommendationSession {
    pub fn new(previously_seen: HashSet<ItemKey>, requested: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            previously_seen,
            requested,
        }
    }
}

/// Pagination window for batch entry points
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BatchPage {
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

/// Outcome of a batch computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Units examined (users, pairs, ...)
    pub processed: usize,
    /// Units that produced a persisted result
    pub computed: usize,
    /// Failure descriptions, truncated for display
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl BatchReport {
    /// Assembles a report, keeping at most `max_errors` entries and
    /// summarizing the rest in a final line
    pub fn new(
        processed: usize,
        computed: usize,
        mut errors: Vec<String>,
        duration_ms: u64,
        max_errors: usize,
    ) -> Self {
        if errors.len() > max_errors {
            let dropped = errors.len() - max_errors;
            errors.truncate(max_errors);
            errors.push(format!("... and {} more", dropped));
        }
        Self {
            processed,
            computed,
            errors,
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;

    #[test]
    fn test_session_carries_cooldown_set() {
        let seen: HashSet<ItemKey> = [ItemKey::new(1, MediaKind::Movie)].into_iter().collect();
        let session = RecommendationSession::new(seen.clone(), 10);
        assert_eq!(session.previously_seen, seen);
        assert_eq!(session.requested, 10);
    }

    #[test]
    fn test_batch_report_caps_errors() {
        let errors: Vec<String> = (0..15).map(|i| format!("pair {} failed", i)).collect();
        let report = BatchReport::new(20, 5, errors, 1234, 10);
        assert_eq!(report.errors.len(), 11);
        assert_eq!(report.errors.last().unwrap(), "... and 5 more");
    }

    #[test]
    fn test_batch_report_keeps_short_error_lists() {
        let report = BatchReport::new(3, 3, vec!["boom".to_string()], 10, 10);
        assert_eq!(report.errors, vec!["boom".to_string()]);
    }
}
