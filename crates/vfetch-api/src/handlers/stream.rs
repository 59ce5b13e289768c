//! Direct stream-URL extraction handler.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use vfetch_media::with_retry;
use vfetch_models::is_supported_url;

use crate::error::{ApiError, ApiResult};
use crate::handlers::enforce_rate_limit;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub url: Option<String>,
}

#[derive(Serialize)]
pub struct StreamResponse {
    pub stream_url: String,
}

/// `GET /stream?url=` — resolve the direct media URL without downloading.
///
/// Stream-URL extraction is cheap and flaky, so unlike full downloads it is
/// retried on failure.
pub async fn stream_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Json<StreamResponse>> {
    let url = query.url.ok_or(ApiError::InvalidUrl)?;
    if !is_supported_url(&url) {
        return Err(ApiError::InvalidUrl);
    }

    enforce_rate_limit(&state, &headers, conn.as_ref()).await?;

    let timeout = state.config.probe_timeout.as_secs();
    let stream_url = with_retry(state.config.retry_attempts, state.config.retry_delay, || {
        state.extractor.stream_url(&url, timeout)
    })
    .await?;

    Ok(Json(StreamResponse { stream_url }))
}
