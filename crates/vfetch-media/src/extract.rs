//! High-level extraction operations built on the command runner.

use std::path::{Path, PathBuf};

use tracing::info;

use vfetch_models::{DesiredFormat, DownloadRequest, VideoInfo};

use crate::command::{AntiBlockOptions, YtdlpCommand, YtdlpRunner};
use crate::cookies::CookiePolicy;
use crate::error::{MediaError, MediaResult};
use crate::store::OutputSlot;

/// Extraction service: owns the tool location and the per-process
/// anti-blocking and cookie configuration.
#[derive(Debug, Clone)]
pub struct Extractor {
    bin: PathBuf,
    anti_block: AntiBlockOptions,
    cookies: CookiePolicy,
}

impl Extractor {
    pub fn new(anti_block: AntiBlockOptions, cookies: CookiePolicy) -> Self {
        Self {
            bin: PathBuf::from("yt-dlp"),
            anti_block,
            cookies,
        }
    }

    /// Override the tool binary. Used by tests to substitute a fake tool.
    pub fn with_bin(mut self, bin: impl AsRef<Path>) -> Self {
        self.bin = bin.as_ref().to_path_buf();
        self
    }

    async fn base_command(&self, url: &str) -> MediaResult<YtdlpCommand> {
        let mut cmd = YtdlpCommand::new(url)
            .program(&self.bin)
            .anti_block(&self.anti_block);
        if let Some(cookies) = self.cookies.resolve().await? {
            cmd = cmd.cookies(cookies);
        }
        Ok(cmd)
    }

    /// Download a video into the reserved slot, returning the saved file.
    ///
    /// Single-attempt by design; only stream-URL extraction retries.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        slot: &OutputSlot,
        timeout_secs: u64,
    ) -> MediaResult<PathBuf> {
        let mut cmd = self
            .base_command(&request.url)
            .await?
            .format(request.format.selector(request.max_height))
            .output(&slot.template);
        if request.format == DesiredFormat::Mp3 {
            cmd = cmd.audio_format("mp3");
        }

        let output = YtdlpRunner::with_timeout(timeout_secs).run(&cmd).await?;
        let path = slot.locate_output(&output.stdout)?;

        info!(
            url = %request.url,
            output = %path.display(),
            "Download finished"
        );
        Ok(path)
    }

    /// Resolve the direct stream URL without downloading (`yt-dlp -g`).
    pub async fn stream_url(&self, url: &str, timeout_secs: u64) -> MediaResult<String> {
        let cmd = self
            .base_command(url)
            .await?
            .stream_url_only()
            .format("best".to_string());

        let output = YtdlpRunner::with_timeout(timeout_secs).run(&cmd).await?;
        output
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| MediaError::InvalidOutput("no stream URL in tool output".into()))
    }

    /// Fetch video metadata without downloading (`yt-dlp -J`).
    pub async fn video_info(&self, url: &str, timeout_secs: u64) -> MediaResult<VideoInfo> {
        let cmd = self.base_command(url).await?.dump_json();
        let output = YtdlpRunner::with_timeout(timeout_secs).run(&cmd).await?;
        Ok(serde_json::from_str(&output.stdout)?)
    }
}
