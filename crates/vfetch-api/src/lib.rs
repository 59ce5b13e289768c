//! Axum HTTP API for the vfetch download service.
//!
//! This crate provides:
//! - Download, stream-URL, and metadata endpoints backed by yt-dlp
//! - Per-client sliding-window rate limiting
//! - Download-directory retention (manual endpoint plus background sweep)

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
