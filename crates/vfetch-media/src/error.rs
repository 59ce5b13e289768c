//! Error types for extraction and file-store operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while orchestrating the extraction tool.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("extraction timed out after {0} seconds")]
    Timeout(u64),

    #[error("yt-dlp failed: {message}")]
    ToolFailure {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("upstream rate limit hit (HTTP 429), try again later")]
    UpstreamRateLimited,

    #[error("cookies file required but not usable: {0}")]
    CookiesRequired(PathBuf),

    #[error("downloaded file could not be located")]
    OutputNotFound,

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("unexpected tool output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a tool failure error, classifying upstream rate limiting.
    ///
    /// A 429 indicator in the diagnostic stream is remapped to
    /// [`MediaError::UpstreamRateLimited`] so callers can distinguish it
    /// from local rate limiting.
    pub fn from_tool_exit(stderr: String, exit_code: Option<i32>) -> Self {
        // Only the explicit HTTP indicators: a bare "429" also appears in
        // filenames and byte counts.
        if stderr.contains("HTTP Error 429") || stderr.contains("Too Many Requests") {
            return Self::UpstreamRateLimited;
        }

        let message = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("unknown error")
            .to_string();

        Self::ToolFailure {
            message,
            stderr: Some(stderr),
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_remapped_to_upstream_rate_limited() {
        let err = MediaError::from_tool_exit(
            "ERROR: unable to download: HTTP Error 429: Too Many Requests".to_string(),
            Some(1),
        );
        assert!(matches!(err, MediaError::UpstreamRateLimited));
    }

    #[test]
    fn test_429_in_filename_stays_tool_failure() {
        let err = MediaError::from_tool_exit(
            "ERROR: unable to rename file clip-429.part".to_string(),
            Some(1),
        );
        assert!(matches!(err, MediaError::ToolFailure { .. }));
    }

    #[test]
    fn test_tool_failure_keeps_last_diagnostic_line() {
        let err = MediaError::from_tool_exit(
            "WARNING: something\nERROR: video unavailable\n".to_string(),
            Some(1),
        );
        match err {
            MediaError::ToolFailure { message, exit_code, .. } => {
                assert_eq!(message, "ERROR: video unavailable");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
