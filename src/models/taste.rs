use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for one catalog item as returned by the external provider
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemMetadata {
    pub genres: Vec<String>,
    pub original_language: Option<String>,
    pub popularity: Option<f64>,
    pub vote_count: Option<u64>,
    /// Billed cast, most prominent first
    pub cast: Vec<String>,
}

/// A user's derived taste profile
///
/// Genre weights are normalized to sum to 1.0 over the genres the user has
/// any signal for. Users with no classified history get the empty sentinel
/// rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TasteMap {
    pub user_id: Uuid,
    pub genre_profile: HashMap<String, f64>,
    pub person_profile: HashMap<String, f64>,
    pub computed_at: DateTime<Utc>,
}

impl TasteMap {
    /// Sentinel for users without any classified genre data
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            genre_profile: HashMap::new(),
            person_profile: HashMap::new(),
            computed_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.genre_profile.is_empty()
    }
}
