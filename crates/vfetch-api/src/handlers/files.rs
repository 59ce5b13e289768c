//! Stored-file serving handler.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use vfetch_media::MediaError;

use crate::error::ApiResult;
use crate::handlers::download::attachment_response;
use crate::state::AppState;

/// `GET /files/{name}` — serve a previously downloaded file as an
/// attachment. 404 when the (sanitized) name does not resolve to a file.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let path = state.store.resolve(&name)?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| MediaError::FileNotFound(path.clone()))?;

    attachment_response(&filename, Body::from_stream(ReaderStream::new(file)))
}
