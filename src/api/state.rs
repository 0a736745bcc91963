use std::sync::Arc;

use crate::config::EngineConfig;
use crate::services::{RecommendationService, SimilarityEngine, TasteMapService};

use super::auth::BatchAuthorizer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<RecommendationService>,
    pub similarity: Arc<SimilarityEngine>,
    pub taste_maps: Arc<TasteMapService>,
    pub batch_auth: Arc<dyn BatchAuthorizer>,
    pub engine: EngineConfig,
}
