use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use scaleodm_models::{HealthResponse, ScaleOdmError};

/// Create health router
pub fn create_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Liveness probe. Answers 503 when the metadata store is unreachable.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ScaleOdmError> {
    state.store.health_check().await?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
    }))
}
