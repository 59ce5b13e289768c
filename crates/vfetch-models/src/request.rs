//! Request and metadata types for the download API.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Desired output container for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DesiredFormat {
    /// Best video at or below the height cap plus best audio, merged to mp4.
    #[default]
    Mp4,
    /// Audio-only extraction, transcoded to mp3.
    Mp3,
    /// Whatever single format the extractor considers best, no merging.
    Raw,
}

impl DesiredFormat {
    /// yt-dlp `-f` selector for this format, honoring an optional height cap.
    pub fn selector(&self, max_height: Option<u32>) -> String {
        match self {
            DesiredFormat::Mp4 => match max_height {
                Some(h) => format!("bestvideo[height<={h}]+bestaudio/best"),
                None => "bestvideo+bestaudio/best".to_string(),
            },
            DesiredFormat::Mp3 => "bestaudio/best".to_string(),
            DesiredFormat::Raw => "best".to_string(),
        }
    }
}

/// A single inbound download request. Created per call, never persisted.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DownloadRequest {
    /// Untrusted user-supplied video URL.
    #[validate(length(min = 1, max = 2048))]
    pub url: String,

    /// Desired output container.
    #[serde(default)]
    pub format: DesiredFormat,

    /// Height cap for video downloads (e.g. 720 for 720p).
    #[validate(range(min = 144, max = 4320))]
    pub max_height: Option<u32>,
}

impl DownloadRequest {
    /// Build a request with the given URL and the default format.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: DesiredFormat::default(),
            max_height: None,
        }
    }
}

/// Video metadata as reported by `yt-dlp -J`.
///
/// Only the fields the API exposes are deserialized; the rest of the
/// (very large) info JSON is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub webpage_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_selector_with_height_cap() {
        assert_eq!(
            DesiredFormat::Mp4.selector(Some(720)),
            "bestvideo[height<=720]+bestaudio/best"
        );
        assert_eq!(DesiredFormat::Mp4.selector(None), "bestvideo+bestaudio/best");
        assert_eq!(DesiredFormat::Mp3.selector(Some(720)), "bestaudio/best");
        assert_eq!(DesiredFormat::Raw.selector(None), "best");
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: DownloadRequest =
            serde_json::from_str(r#"{"url": "https://youtu.be/abc123def45"}"#).unwrap();
        assert_eq!(req.format, DesiredFormat::Mp4);
        assert!(req.max_height.is_none());
    }

    #[test]
    fn test_request_validation_rejects_out_of_range_height() {
        let req: DownloadRequest =
            serde_json::from_str(r#"{"url": "https://youtu.be/abc123def45", "max_height": 99999}"#)
                .unwrap();
        assert!(validator::Validate::validate(&req).is_err());
    }

    #[test]
    fn test_video_info_tolerates_missing_fields() {
        let info: VideoInfo = serde_json::from_str(r#"{"title": "clip"}"#).unwrap();
        assert_eq!(info.title, "clip");
        assert!(info.duration.is_none());
        assert!(info.view_count.is_none());
    }
}
