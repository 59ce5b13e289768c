//! Video metadata probe handler.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use vfetch_models::{is_supported_url, VideoInfo};

use crate::error::{ApiError, ApiResult};
use crate::handlers::enforce_rate_limit;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InfoQuery {
    pub url: Option<String>,
}

/// `GET /info?url=` — title, duration, thumbnail, uploader, view count.
pub async fn video_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<InfoQuery>,
) -> ApiResult<Json<VideoInfo>> {
    let url = query.url.ok_or(ApiError::InvalidUrl)?;
    if !is_supported_url(&url) {
        return Err(ApiError::InvalidUrl);
    }

    enforce_rate_limit(&state, &headers, conn.as_ref()).await?;

    let info = state
        .extractor
        .video_info(&url, state.config.probe_timeout.as_secs())
        .await?;
    Ok(Json(info))
}
