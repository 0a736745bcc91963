use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An unordered user pair in canonical order (`a < b`)
///
/// Every similarity read and write goes through this type, which is what
/// guarantees at most one persisted row per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserPair {
    user_a: Uuid,
    user_b: Uuid,
}

impl UserPair {
    /// Builds the canonical ordering for two distinct users
    ///
    /// Returns `None` when both ids are the same user.
    pub fn new(x: Uuid, y: Uuid) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { user_a: x, user_b: y }),
            std::cmp::Ordering::Greater => Some(Self { user_a: y, user_b: x }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn a(&self) -> Uuid {
        self.user_a
    }

    pub fn b(&self) -> Uuid {
        self.user_b
    }

    /// The other side of the pair, if `user_id` is part of it
    pub fn other(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.user_a {
            Some(self.user_b)
        } else if user_id == self.user_b {
            Some(self.user_a)
        } else {
            None
        }
    }
}

/// Persisted pairwise similarity between two users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityScore {
    pub pair: UserPair,
    /// Combined score in [0, 1]; see `similarity::overall_match`
    pub overall_match: f64,
    pub taste_similarity: f64,
    pub rating_correlation: f64,
    pub person_overlap: f64,
    /// Rated-item counts for each side at computation time
    pub snapshot_a: u32,
    pub snapshot_b: u32,
    /// Set on first insert, preserved by upserts
    pub computed_at: DateTime<Utc>,
    /// Refreshed by every upsert
    pub updated_at: DateTime<Utc>,
    pub computed_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_canonical_regardless_of_argument_order() {
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let p1 = UserPair::new(x, y).unwrap();
        let p2 = UserPair::new(y, x).unwrap();
        assert_eq!(p1, p2);
        assert!(p1.a() < p1.b());
    }

    #[test]
    fn test_pair_rejects_self() {
        let x = Uuid::new_v4();
        assert!(UserPair::new(x, x).is_none());
    }

    #[test]
    fn test_pair_other() {
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let pair = UserPair::new(x, y).unwrap();
        assert_eq!(pair.other(x), Some(y));
        assert_eq!(pair.other(y), Some(x));
        assert_eq!(pair.other(Uuid::new_v4()), None);
    }
}
