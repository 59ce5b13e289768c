//! Request handlers.
//!
//! Every extraction handler walks the same states: validate the URL, check
//! the rate limit, invoke the tool, respond. Validation and rate-limit
//! failures short-circuit before any subprocess is spawned.

pub mod cleanup;
pub mod download;
pub mod files;
pub mod health;
pub mod info;
pub mod stream;

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;

use crate::error::{ApiError, ApiResult};
use crate::middleware::client_key;
use crate::state::AppState;

pub use cleanup::run_cleanup;
pub use download::{download_get, download_post};
pub use files::serve_file;
pub use health::health;
pub use info::video_info;
pub use stream::stream_url;

/// Enforce the per-client extraction rate limit.
pub(crate) async fn enforce_rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    conn: Option<&ConnectInfo<SocketAddr>>,
) -> ApiResult<()> {
    let key = client_key(headers, conn);
    if state.limiter.check(&key).await {
        Ok(())
    } else {
        Err(ApiError::RateLimited(state.config.rate_limit_per_minute))
    }
}
