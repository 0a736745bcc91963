use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::SimilarityScore;
use crate::services::similarity::PairOutcome;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub limit: Option<usize>,
    /// When set, scores below the similarity threshold are included too
    #[serde(default)]
    pub include_all: bool,
}

/// Handler for a user's ranked similar-users list
pub async fn similar_users(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<SimilarQuery>,
) -> AppResult<Json<Vec<SimilarityScore>>> {
    let limit = query.limit.unwrap_or(state.engine.default_result_limit);
    let scores = state
        .similarity
        .similar_users(user_id, limit, query.include_all)
        .await?;
    Ok(Json(scores))
}

/// Handler for on-demand pairwise similarity
///
/// Insufficient shared history is a 200 with an explicit
/// `not_enough_data` status, not a server error.
pub async fn pair_similarity(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<PairOutcome>> {
    let outcome = state.similarity.compute_pair(user_a, user_b).await?;
    Ok(Json(outcome))
}
