mod recommendation;
mod similarity;
mod taste;
mod watch;

pub use recommendation::{
    BatchPage, BatchReport, Candidate, RankedRecommendation, RecommendationSession,
};
pub use similarity::{SimilarityScore, UserPair};
pub use taste::{ItemMetadata, TasteMap};
pub use watch::{ItemKey, MediaKind, RatingAction, RatingHistoryEntry, WatchEntry, WatchStatus};
