use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::recommendations::SessionResult;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<usize>,
}

/// Handler for a user's recommendation session
pub async fn recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<SessionResult>> {
    let limit = query.limit.unwrap_or(state.engine.default_result_limit);
    let result = state.recommendations.recommend(user_id, limit).await?;
    Ok(Json(result))
}
