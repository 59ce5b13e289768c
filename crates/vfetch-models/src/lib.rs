//! Shared data models for the vfetch backend.
//!
//! This crate provides Serde-serializable types for:
//! - Download requests and desired output formats
//! - Video metadata returned by the probe endpoint
//! - YouTube URL validation and video-id extraction

pub mod request;
pub mod youtube_url;

// Re-export common types
pub use request::{DesiredFormat, DownloadRequest, VideoInfo};
pub use youtube_url::{extract_video_id, is_supported_url};
