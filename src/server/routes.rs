//! Router configuration for the web server.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Remote downloads
        .route(
            "/downloads",
            post(handlers::create_download).get(handlers::list_downloads),
        )
        .route("/downloads/:id", delete(handlers::delete_download))
        .route("/downloads/:id/pause", post(handlers::pause_download))
        .route("/downloads/:id/resume", post(handlers::resume_download))
        .route("/downloads/:id/file", get(handlers::download_file))
        // Live channel
        .route("/downloads/events", get(handlers::download_events))
        // Status API
        .route("/api/status", get(handlers::api_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
