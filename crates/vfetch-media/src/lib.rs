#![deny(unreachable_patterns)]
//! yt-dlp CLI wrapper for the vfetch backend.
//!
//! This crate provides:
//! - Type-safe yt-dlp command building with anti-blocking flags
//! - Subprocess execution with hard timeouts and forced kill on expiry
//! - Output discovery (destination marker with a recency fallback)
//! - A fixed-count retry helper for transient failures
//! - Download-directory lifecycle: reservation, serving, age-based cleanup

pub mod command;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod retry;
pub mod store;

pub use command::{check_ytdlp, AntiBlockOptions, ToolOutput, YtdlpCommand, YtdlpRunner};
pub use cookies::{writable_cookies_path, CookiePolicy};
pub use error::{MediaError, MediaResult};
pub use extract::Extractor;
pub use retry::with_retry;
pub use store::{
    parse_destination_marker, sanitize_filename, DownloadStore, EphemeralFile, NamingScheme,
    OutputSlot,
};
