//! Health check endpoint

use axum::{extract::State, Json};

use crate::dto::HealthResponse;
use crate::AppState;

/// GET /health - API liveness plus open session count
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(state.session_count().await))
}
