//! Decayed weighted-rating calculator
//!
//! Collapses the append-only rating history of one (user, item) pair into
//! a single current score. Pure and deterministic: the same ordered
//! history always reproduces the same stored `weighted_rating`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{ItemKey, RatingAction, RatingHistoryEntry, WatchEntry};
use crate::store::WatchStore;

const INITIAL_WEIGHT: f64 = 1.0;
const RATING_CHANGE_WEIGHT: f64 = 0.9;
const REWATCH_DECAY: f64 = 0.2;
const REWATCH_FLOOR: f64 = 0.3;

/// How the rating was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingMethod {
    /// Derived from the full rating history
    WeightedHistory,
    /// No history rows; the raw stored rating stands as-is
    NoHistory,
    /// The user does not track this item at all
    NoRatingFound,
}

/// Result of a weighted-rating computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRating {
    pub rating: Option<f64>,
    /// History rows considered
    pub total_reviews: usize,
    pub method: RatingMethod,
}

/// Weight of one history row given its action and, for rewatches, its
/// recency rank among rewatch entries (1 = most recent rewatch)
fn entry_weight(action: RatingAction, rewatch_rank: usize) -> f64 {
    match action {
        RatingAction::Initial => INITIAL_WEIGHT,
        RatingAction::RatingChange => RATING_CHANGE_WEIGHT,
        RatingAction::Rewatch => {
            (INITIAL_WEIGHT - REWATCH_DECAY * (rewatch_rank as f64 + 1.0)).max(REWATCH_FLOOR)
        }
    }
}

/// Computes the decayed weighted rating for one (user, item) pair
///
/// `history` must be ordered most recent first, which is the contract of
/// [`WatchStore::rating_history`].
pub fn weighted_rating(entry: Option<&WatchEntry>, history: &[RatingHistoryEntry]) -> WeightedRating {
    let Some(entry) = entry else {
        return WeightedRating {
            rating: None,
            total_reviews: 0,
            method: RatingMethod::NoRatingFound,
        };
    };

    if history.is_empty() {
        return WeightedRating {
            rating: entry.user_rating,
            total_reviews: 0,
            method: RatingMethod::NoHistory,
        };
    }

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut rewatch_rank = 0;

    for row in history {
        if row.action == RatingAction::Rewatch {
            rewatch_rank += 1;
        }
        let weight = entry_weight(row.action, rewatch_rank);
        weighted_sum += weight * row.rating;
        weight_sum += weight;
    }

    let rating = (weighted_sum / weight_sum * 10.0).round() / 10.0;

    WeightedRating {
        rating: Some(rating),
        total_reviews: history.len(),
        method: RatingMethod::WeightedHistory,
    }
}

/// Recomputes the weighted rating from the store and writes it back
///
/// The stored `weighted_rating` column is purely derived; this is the only
/// code path that writes it.
pub async fn recompute_and_store(
    store: &dyn WatchStore,
    user_id: Uuid,
    item: &ItemKey,
) -> AppResult<WeightedRating> {
    let entry = store.watch_entry(user_id, item).await?;
    let history = store.rating_history(user_id, item).await?;
    let result = weighted_rating(entry.as_ref(), &history);

    if let Some(rating) = result.rating {
        store.save_weighted_rating(user_id, item, rating).await?;
    }

    Ok(result)
}
