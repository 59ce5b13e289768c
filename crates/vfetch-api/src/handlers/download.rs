//! Download handlers: validate, rate-check, extract, stream the file back.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use validator::Validate;

use vfetch_media::{sanitize_filename, EphemeralFile, MediaError, NamingScheme};
use vfetch_models::{extract_video_id, is_supported_url, DesiredFormat, DownloadRequest};

use crate::error::{ApiError, ApiResult};
use crate::handlers::enforce_rate_limit;
use crate::state::AppState;

/// Query parameters of `GET /download`.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
    pub quality: Option<String>,
}

/// Height cap applied when the quality parameter is missing or unparsable.
const DEFAULT_MAX_HEIGHT: u32 = 720;

/// `GET /download?url=&quality=`
pub async fn download_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let url = query.url.ok_or(ApiError::InvalidUrl)?;

    // Unparsable quality falls back to the default rather than erroring.
    let max_height = query
        .quality
        .as_deref()
        .and_then(|q| q.parse().ok())
        .unwrap_or(DEFAULT_MAX_HEIGHT);

    let request = DownloadRequest {
        url,
        format: DesiredFormat::Mp4,
        max_height: Some(max_height),
    };

    run_download(state, request, &headers, conn.as_ref()).await
}

/// `POST /download` with a JSON body.
pub async fn download_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<Response> {
    run_download(state, request, &headers, conn.as_ref()).await
}

async fn run_download(
    state: AppState,
    request: DownloadRequest,
    headers: &HeaderMap,
    conn: Option<&ConnectInfo<SocketAddr>>,
) -> ApiResult<Response> {
    if !is_supported_url(&request.url) {
        return Err(ApiError::InvalidUrl);
    }
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    enforce_rate_limit(&state, headers, conn).await?;

    let scheme = if state.config.ephemeral {
        NamingScheme::Uuid
    } else {
        state.config.naming
    };
    // Under the UUID scheme the video id makes the served filename
    // recognizable; the title scheme gets the id from the tool itself.
    let video_id = extract_video_id(&request.url);
    let slot = state
        .store
        .reserve(scheme, video_id.as_deref())
        .map_err(ApiError::Media)?;

    let result = state
        .extractor
        .download(&request, &slot, state.config.download_timeout.as_secs())
        .await;

    let path = match result {
        Ok(path) => path,
        Err(err) => {
            // Partial output must not outlive the request; the cleanup
            // sweep would catch it anyway, but there is no reason to wait.
            let _ = tokio::fs::remove_dir_all(&slot.dir).await;
            return Err(err.into());
        }
    };

    let filename = path
        .file_name()
        .map(|n| sanitize_filename(&n.to_string_lossy()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download".to_string());

    let body = if state.config.ephemeral {
        // Serve once; the file and its slot are deleted when the body
        // stream is dropped, after transmission completes.
        Body::from_stream(EphemeralFile::open(&path, Some(slot.dir.clone())).await?)
    } else {
        let published = state.store.publish(&slot, &path).await?;
        let file = tokio::fs::File::open(&published)
            .await
            .map_err(MediaError::from)?;
        Body::from_stream(ReaderStream::new(file))
    };

    attachment_response(&filename, body)
}

/// Build a binary attachment response around a streamed body.
pub(crate) fn attachment_response(filename: &str, body: Body) -> ApiResult<Response> {
    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(body)
        .map_err(|e| ApiError::bad_request(e.to_string()))
}
