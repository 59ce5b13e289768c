//! API error types and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vfetch_media::MediaError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid or missing video URL")]
    InvalidUrl,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded. Max {0} downloads per minute.")]
    RateLimited(u32),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidUrl | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Media(MediaError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Media(MediaError::UpstreamRateLimited) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Media(MediaError::FileNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Trim tool diagnostics before they reach a client: a single short line,
/// with anything that looks like a filesystem path dropped.
fn sanitize_diagnostic(text: &str) -> String {
    const MAX_LEN: usize = 300;
    let line: String = text
        .split_whitespace()
        .filter(|w| !w.starts_with('/') && !w.starts_with("~/"))
        .collect::<Vec<_>>()
        .join(" ");
    if line.chars().count() > MAX_LEN {
        let truncated: String = line.chars().take(MAX_LEN).collect();
        format!("{truncated}…")
    } else {
        line
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let detail = match &self {
            // Tool diagnostics may leak paths and internals; sanitize.
            ApiError::Media(MediaError::ToolFailure { message, .. }) => {
                format!("Download failed: {}", sanitize_diagnostic(message))
            }
            ApiError::Media(MediaError::Io(_)) | ApiError::Media(MediaError::JsonParse(_)) => {
                "An internal error occurred".to_string()
            }
            ApiError::Media(MediaError::FileNotFound(_)) => "File not found".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
