//! Cookie-file handling for authenticated extraction.
//!
//! The source cookies file is often mounted read-only, but yt-dlp tries to
//! write cookies back after use, so a writable copy is made once per
//! process and handed to the tool instead.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Minimum size for a plausible Netscape cookies file (bytes).
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Guards the one-time copy to the writable location.
static COPY_LOCK: OnceLock<Mutex<bool>> = OnceLock::new();

/// Cookie-file policy for extraction requests.
#[derive(Debug, Clone, Default)]
pub struct CookiePolicy {
    /// Source cookies file, if configured.
    pub source: Option<PathBuf>,
    /// When true, a missing or unusable cookies file is a hard failure
    /// instead of a silent fallback to unauthenticated extraction.
    pub required: bool,
}

impl CookiePolicy {
    /// Resolve the cookies file to pass to the tool, if any.
    ///
    /// Returns `Ok(None)` when no usable cookies exist and they are not
    /// required; `Err(CookiesRequired)` when they are.
    pub async fn resolve(&self) -> MediaResult<Option<PathBuf>> {
        let Some(source) = &self.source else {
            return if self.required {
                Err(MediaError::CookiesRequired(PathBuf::from("<unset>")))
            } else {
                Ok(None)
            };
        };

        match writable_cookies_path(source).await {
            Some(path) => Ok(Some(path)),
            None if self.required => Err(MediaError::CookiesRequired(source.clone())),
            None => Ok(None),
        }
    }
}

/// Validate that file content appears to be in Netscape cookie format.
///
/// Netscape files either start with the standard header or contain
/// tab-separated lines with at least six fields.
fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File")
        || content.starts_with("# HTTP Cookie File")
    {
        return true;
    }

    content.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line.split('\t').count() >= 6
    })
}

/// Get a writable copy of the source cookies file.
///
/// Returns `None` when the file is missing, too small, or not in Netscape
/// format. The copy is made at most once per process.
pub async fn writable_cookies_path(source: &Path) -> Option<PathBuf> {
    if !source.exists() {
        debug!("Cookies file not found at {}, skipping", source.display());
        return None;
    }

    match tokio::fs::metadata(source).await {
        Ok(meta) if meta.len() < MIN_COOKIES_FILE_SIZE => {
            debug!(
                "Cookies file {} is too small ({} bytes), skipping",
                source.display(),
                meta.len()
            );
            return None;
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Failed to read cookies file metadata: {}", e);
            return None;
        }
    }

    match tokio::fs::read_to_string(source).await {
        Ok(content) if !is_valid_netscape_cookies(&content) => {
            debug!(
                "Cookies file {} is not in Netscape format, skipping",
                source.display()
            );
            return None;
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Failed to read cookies file: {}", e);
            return None;
        }
    }

    let temp_path = std::env::temp_dir().join("vfetch-cookies.txt");
    let lock = COPY_LOCK.get_or_init(|| Mutex::new(false));
    let mut copied = lock.lock().await;

    if !*copied || !temp_path.exists() {
        if let Err(e) = tokio::fs::copy(source, &temp_path).await {
            warn!("Failed to copy cookies file to temp: {}", e);
            return None;
        }
        debug!("Copied cookies file to writable location: {}", temp_path.display());
        *copied = true;
    }

    info!("Using cookies file for authenticated extraction");
    Some(temp_path)
}
