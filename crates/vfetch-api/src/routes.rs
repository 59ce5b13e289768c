//! API routes.

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    download_get, download_post, health, run_cleanup, serve_file, stream_url, video_info,
};
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/download", get(download_get).post(download_post))
        .route("/stream", get(stream_url))
        .route("/info", get(video_info))
        .route("/files/:name", get(serve_file))
        .route("/cleanup", get(run_cleanup).post(run_cleanup))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
