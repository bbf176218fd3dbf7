//! HTTP API
//!
//! Upload and retrieval endpoints for text, images and audio, plus a health check.

pub mod handlers;

use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health))

        // Poison endpoints
        .route(
            "/poison/text",
            get(handlers::get_text).post(handlers::post_text),
        )
        .route(
            "/poison/images",
            get(handlers::get_image).post(handlers::post_image),
        )
        .route(
            "/poison/audio",
            get(handlers::get_audio).post(handlers::post_audio),
        )

        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
