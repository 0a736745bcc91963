use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod batch;
pub mod recommendations;
pub mod similarity;
pub mod state;

pub use state::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/recommendations",
            get(recommendations::recommendations),
        )
        .route("/users/:user_id/similar", get(similarity::similar_users))
        .route(
            "/similarity/:user_a/:user_b",
            get(similarity::pair_similarity),
        )
        .route("/admin/similarity/batch", post(batch::similarity_batch))
        .route("/admin/taste-maps/batch", post(batch::taste_map_batch))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
