//! The NodeODM-compatible HTTP surface and the task orchestrator behind it.

pub mod config;
pub mod orchestrator;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod validate;

pub use config::AppConfig;
pub use orchestrator::TaskOrchestrator;
pub use state::AppState;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::tasks::create_router())
        .merge(routes::server::create_router())
        .merge(routes::health::create_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
