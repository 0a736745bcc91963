pub mod algorithms;
pub mod batch;
pub mod providers;
pub mod recommendations;
pub mod scorer;
pub mod similarity;
pub mod taste_map;
pub mod weighted_rating;

pub use recommendations::RecommendationService;
pub use similarity::SimilarityEngine;
pub use taste_map::TasteMapService;
