//! Application state.

use std::sync::Arc;
use std::time::Duration;

use vfetch_media::{DownloadStore, Extractor};

use crate::config::ApiConfig;
use crate::middleware::SlidingWindowLimiter;

/// Shared application state, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<DownloadStore>,
    pub extractor: Arc<Extractor>,
    pub limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    /// Create application state from config.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store = DownloadStore::new(&config.download_dir)?;

        let mut extractor = Extractor::new(config.anti_block.clone(), config.cookies.clone());
        if let Some(bin) = &config.ytdlp_bin {
            extractor = extractor.with_bin(bin);
        }

        let limiter = SlidingWindowLimiter::new(
            config.rate_limit_per_minute,
            Duration::from_secs(60),
        );

        Ok(Self {
            config,
            store: Arc::new(store),
            extractor: Arc::new(extractor),
            limiter: Arc::new(limiter),
        })
    }
}
