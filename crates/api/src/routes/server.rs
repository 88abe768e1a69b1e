use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use scaleodm_models::{odm_options, NodeInfo, OdmOption};

/// Create the router for the node-level NodeODM endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/info", get(node_info))
        .route("/options", get(options))
}

/// Node information, including a best-effort count of queued workflows.
pub async fn node_info(State(state): State<AppState>) -> Json<NodeInfo> {
    Json(state.orchestrator.node_info().await)
}

/// The advertised ODM processing options.
pub async fn options() -> Json<Vec<OdmOption>> {
    Json(odm_options())
}
