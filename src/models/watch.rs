use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of media an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
    Anime,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
            MediaKind::Anime => "anime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(MediaKind::Movie),
            "tv" => Some(MediaKind::Tv),
            "anime" => Some(MediaKind::Anime),
            _ => None,
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an item sits in a user's watch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    Want,
    Watched,
    Rewatched,
    Dropped,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Want => "want",
            WatchStatus::Watched => "watched",
            WatchStatus::Rewatched => "rewatched",
            WatchStatus::Dropped => "dropped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "want" => Some(WatchStatus::Want),
            "watched" => Some(WatchStatus::Watched),
            "rewatched" => Some(WatchStatus::Rewatched),
            "dropped" => Some(WatchStatus::Dropped),
            _ => None,
        }
    }

    /// Statuses that mean the user actually finished the item at least once
    pub fn is_watched(&self) -> bool {
        matches!(self, WatchStatus::Watched | WatchStatus::Rewatched)
    }
}

/// Action recorded in the append-only rating history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingAction {
    Initial,
    RatingChange,
    Rewatch,
}

impl RatingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingAction::Initial => "initial",
            RatingAction::RatingChange => "rating_change",
            RatingAction::Rewatch => "rewatch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(RatingAction::Initial),
            "rating_change" => Some(RatingAction::RatingChange),
            "rewatch" => Some(RatingAction::Rewatch),
            _ => None,
        }
    }
}

/// Composite identity of a media item as tracked by the service
///
/// Items are identified by an external catalog id plus their media kind;
/// the same numeric id can exist for both a movie and a TV show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub external_item_id: i64,
    pub media_kind: MediaKind,
}

impl ItemKey {
    pub fn new(external_item_id: i64, media_kind: MediaKind) -> Self {
        Self {
            external_item_id,
            media_kind,
        }
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.media_kind, self.external_item_id)
    }
}

/// One row of a user's watch list, unique per (user, item)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchEntry {
    pub user_id: Uuid,
    pub item: ItemKey,
    pub status: WatchStatus,
    /// Raw rating as last set by the user, 0-10
    pub user_rating: Option<f64>,
    /// Decayed rating derived from the rating history; never hand-edited
    pub weighted_rating: Option<f64>,
    pub watch_count: u32,
    pub added_at: DateTime<Utc>,
    pub watched_date: Option<DateTime<Utc>>,
}

/// Append-only record of a rating-affecting action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingHistoryEntry {
    pub user_id: Uuid,
    pub item: ItemKey,
    pub rating: f64,
    pub action: RatingAction,
    pub created_at: DateTime<Utc>,
}
