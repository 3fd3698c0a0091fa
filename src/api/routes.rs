//! API Routes
//!
//! Configures the Axum router for the admin endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health_handler, snapshot_handler, stats_handler, AppState};

/// Creates the admin router.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /stats` - Aggregated cache statistics
/// - `POST /snapshot` - Write a snapshot now
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/snapshot", post(snapshot_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
