//! YouTube URL validation and video-id extraction.
//!
//! URLs are treated as untrusted input. Validation is pure string matching
//! against a fixed set of patterns; no network access is ever performed.
//! Accepted forms, with or without scheme and `www.`/`m.` prefix:
//! - `youtube.com/watch?v=ID` (canonical watch page)
//! - `youtu.be/ID` (shortened)
//! - `youtube.com/shorts/ID`
//! - `youtube.com/embed/ID`
//! - `youtube.com/live/ID`

use std::sync::OnceLock;

use regex::Regex;

/// Compiled patterns for every accepted URL form.
fn url_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^(https?://)?(www\.|m\.)?youtube\.com/watch\?v=[\w-]+",
            r"^(https?://)?youtu\.be/[\w-]+",
            r"^(https?://)?(www\.|m\.)?youtube\.com/shorts/[\w-]+",
            r"^(https?://)?(www\.|m\.)?youtube\.com/embed/[\w-]+",
            r"^(https?://)?(www\.|m\.)?youtube\.com/live/[\w-]+",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("hardcoded pattern compiles"))
        .collect()
    })
}

/// Check whether a candidate URL matches one of the supported YouTube forms.
pub fn is_supported_url(url: &str) -> bool {
    let url = url.trim();
    url_patterns().iter().any(|p| p.is_match(url))
}

/// Extract the 11-character video id from a supported URL.
///
/// Returns `None` when the URL is unsupported or the id segment does not
/// look like a YouTube video id (alphanumeric plus `-_`).
pub fn extract_video_id(url: &str) -> Option<String> {
    static ID: OnceLock<Regex> = OnceLock::new();
    let id_re = ID.get_or_init(|| {
        Regex::new(r"(?:\?v=|&v=|youtu\.be/|/shorts/|/embed/|/live/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)")
            .expect("hardcoded pattern compiles")
    });

    if !is_supported_url(url) {
        return None;
    }
    id_re
        .captures(url.trim())
        .map(|c| c[1].to_string())
}
