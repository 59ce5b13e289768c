//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use vfetch_media::{AntiBlockOptions, CookiePolicy, NamingScheme};

/// Server configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Download directory root
    pub download_dir: PathBuf,
    /// Max extraction requests per client per minute
    pub rate_limit_per_minute: u32,
    /// Wall-clock timeout for full downloads
    pub download_timeout: Duration,
    /// Wall-clock timeout for stream-URL and info probes
    pub probe_timeout: Duration,
    /// Stream-URL retry attempts
    pub retry_attempts: u32,
    /// Delay between stream-URL retry attempts
    pub retry_delay: Duration,
    /// Age threshold for the cleanup sweep
    pub retention: Duration,
    /// Serve-once mode: delete each download after it is transmitted
    pub ephemeral: bool,
    /// Output naming scheme for persistent downloads
    pub naming: NamingScheme,
    /// Max request body size
    pub max_body_size: usize,
    /// Anti-blocking flags passed through to the tool
    pub anti_block: AntiBlockOptions,
    /// Cookie-file policy
    pub cookies: CookiePolicy,
    /// Override for the tool binary (default: yt-dlp from PATH)
    pub ytdlp_bin: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            download_dir: PathBuf::from("youtube_downloads"),
            rate_limit_per_minute: 3,
            download_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(3),
            retention: Duration::from_secs(3600),
            ephemeral: false,
            naming: NamingScheme::Title,
            max_body_size: 16 * 1024 * 1024,
            anti_block: AntiBlockOptions::default(),
            cookies: CookiePolicy::default(),
            ytdlp_bin: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let anti_block = AntiBlockOptions {
            throttled_rate: std::env::var("YTDLP_THROTTLED_RATE").ok(),
            sleep_interval: std::env::var("YTDLP_SLEEP_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok()),
            max_sleep_interval: std::env::var("YTDLP_MAX_SLEEP_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok()),
            force_ipv4: env_flag("YTDLP_FORCE_IPV4"),
            geo_bypass: env_flag("YTDLP_GEO_BYPASS"),
            no_check_certificate: env_flag("YTDLP_NO_CHECK_CERTIFICATE"),
            user_agent: std::env::var("YTDLP_USER_AGENT").ok(),
        };

        let cookies = CookiePolicy {
            source: std::env::var("COOKIES_FILE").ok().map(PathBuf::from),
            required: env_flag("COOKIES_REQUIRED"),
        };

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT", defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            download_dir: std::env::var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            download_timeout: Duration::from_secs(env_parse("DOWNLOAD_TIMEOUT_SECS", 600)),
            probe_timeout: Duration::from_secs(env_parse("PROBE_TIMEOUT_SECS", 30)),
            retry_attempts: env_parse("STREAM_RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_delay: Duration::from_secs(env_parse("STREAM_RETRY_DELAY_SECS", 3)),
            retention: Duration::from_secs(env_parse("RETENTION_SECS", 3600)),
            ephemeral: env_flag("EPHEMERAL_DOWNLOADS"),
            naming: match std::env::var("NAMING_SCHEME").as_deref() {
                Ok("uuid") => NamingScheme::Uuid,
                _ => NamingScheme::Title,
            },
            max_body_size: env_parse("MAX_BODY_SIZE", defaults.max_body_size),
            anti_block,
            cookies,
            ytdlp_bin: std::env::var("YTDLP_BIN").ok().map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_policy() {
        let cfg = ApiConfig::default();
        assert_eq!(cfg.rate_limit_per_minute, 3);
        assert_eq!(cfg.download_timeout, Duration::from_secs(600));
        assert_eq!(cfg.probe_timeout, Duration::from_secs(30));
        assert_eq!(cfg.retry_attempts, 3);
        assert_eq!(cfg.retry_delay, Duration::from_secs(3));
        assert_eq!(cfg.retention, Duration::from_secs(3600));
        assert!(!cfg.ephemeral);
    }
}
