use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};

use crate::error::{AppError, AppResult};
use crate::models::{BatchPage, BatchReport};

use super::AppState;

/// Header carrying the shared batch-trigger secret
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn require_batch_access(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if state.batch_auth.authorize(token) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "batch endpoints require a valid admin token".to_string(),
        ))
    }
}

/// Handler triggering batch pairwise-similarity computation
pub async fn similarity_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(page): Json<BatchPage>,
) -> AppResult<Json<BatchReport>> {
    require_batch_access(&state, &headers)?;
    let report = state.similarity.compute_all(page).await?;
    Ok(Json(report))
}

/// Handler triggering batch taste-map refresh
pub async fn taste_map_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(page): Json<BatchPage>,
) -> AppResult<Json<BatchReport>> {
    require_batch_access(&state, &headers)?;
    let report = state.taste_maps.refresh_all(page).await?;
    Ok(Json(report))
}
