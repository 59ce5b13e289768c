//! yt-dlp command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Anti-blocking knobs passed through to yt-dlp.
///
/// Every toggle is optional and independently settable; none of them
/// changes the control flow of an invocation.
#[derive(Debug, Clone, Default)]
pub struct AntiBlockOptions {
    /// `--throttled-rate` value, e.g. "1M".
    pub throttled_rate: Option<String>,
    /// `--sleep-interval` seconds between requests.
    pub sleep_interval: Option<u64>,
    /// `--max-sleep-interval` seconds.
    pub max_sleep_interval: Option<u64>,
    /// Force IPv4 to dodge some IP-range blocks.
    pub force_ipv4: bool,
    /// Bypass geographic restrictions.
    pub geo_bypass: bool,
    /// Skip TLS certificate verification.
    pub no_check_certificate: bool,
    /// User-agent override.
    pub user_agent: Option<String>,
}

/// Builder for yt-dlp invocations.
#[derive(Debug, Clone)]
pub struct YtdlpCommand {
    /// Tool binary (name resolved via PATH, or an absolute path).
    program: PathBuf,
    /// Target video URL, always the last argument.
    url: String,
    /// `-f` format selector.
    format: Option<String>,
    /// `-o` output template.
    output: Option<String>,
    /// Extract audio and transcode (`-x --audio-format <fmt>`).
    audio_format: Option<String>,
    /// Print the direct media URL instead of downloading (`-g`).
    stream_url_only: bool,
    /// Dump the full info JSON instead of downloading (`-J`).
    dump_json: bool,
    /// Cookies file passed to the extractor.
    cookies: Option<PathBuf>,
    /// Anti-blocking flags.
    anti_block: AntiBlockOptions,
}

impl YtdlpCommand {
    /// Create a command for the given URL with no output configured.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            url: url.into(),
            format: None,
            output: None,
            audio_format: None,
            stream_url_only: false,
            dump_json: false,
            cookies: None,
            anti_block: AntiBlockOptions::default(),
        }
    }

    /// Override the tool binary. Used by tests to substitute a fake tool.
    pub fn program(mut self, program: impl AsRef<Path>) -> Self {
        self.program = program.as_ref().to_path_buf();
        self
    }

    /// Set the `-f` format selector.
    pub fn format(mut self, selector: impl Into<String>) -> Self {
        self.format = Some(selector.into());
        self
    }

    /// Set the `-o` output template.
    pub fn output(mut self, template: impl Into<String>) -> Self {
        self.output = Some(template.into());
        self
    }

    /// Extract audio only, transcoded to the given container.
    pub fn audio_format(mut self, fmt: impl Into<String>) -> Self {
        self.audio_format = Some(fmt.into());
        self
    }

    /// Print the direct stream URL instead of downloading.
    pub fn stream_url_only(mut self) -> Self {
        self.stream_url_only = true;
        self
    }

    /// Dump the info JSON instead of downloading.
    pub fn dump_json(mut self) -> Self {
        self.dump_json = true;
        self
    }

    /// Pass a cookies file to the extractor.
    pub fn cookies(mut self, path: impl AsRef<Path>) -> Self {
        self.cookies = Some(path.as_ref().to_path_buf());
        self
    }

    /// Apply anti-blocking flags.
    pub fn anti_block(mut self, opts: &AntiBlockOptions) -> Self {
        self.anti_block = opts.clone();
        self
    }

    /// Build the final argument list.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push("--no-playlist".to_string());
        args.push("--no-warnings".to_string());

        if self.stream_url_only {
            args.push("-g".to_string());
        }
        if self.dump_json {
            args.push("-J".to_string());
        }

        if let Some(rate) = &self.anti_block.throttled_rate {
            args.push("--throttled-rate".to_string());
            args.push(rate.clone());
        }
        if let Some(secs) = self.anti_block.sleep_interval {
            args.push("--sleep-interval".to_string());
            args.push(secs.to_string());
        }
        if let Some(secs) = self.anti_block.max_sleep_interval {
            args.push("--max-sleep-interval".to_string());
            args.push(secs.to_string());
        }
        if self.anti_block.force_ipv4 {
            args.push("--force-ipv4".to_string());
        }
        if self.anti_block.geo_bypass {
            args.push("--geo-bypass".to_string());
        }
        if self.anti_block.no_check_certificate {
            args.push("--no-check-certificate".to_string());
        }
        if let Some(ua) = &self.anti_block.user_agent {
            args.push("--user-agent".to_string());
            args.push(ua.clone());
        }

        if let Some(cookies) = &self.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }

        if let Some(fmt) = &self.format {
            args.push("-f".to_string());
            args.push(fmt.clone());
        }
        if let Some(audio) = &self.audio_format {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(audio.clone());
        }
        if let Some(output) = &self.output {
            args.push("-o".to_string());
            args.push(output.clone());
        }

        args.push(self.url.clone());
        args
    }
}

/// Captured output of a finished tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runner for yt-dlp with a hard wall-clock timeout.
///
/// Timeout expiry kills the child process rather than abandoning it, so no
/// orphaned extractor keeps consuming bandwidth after the request is gone.
#[derive(Debug, Clone)]
pub struct YtdlpRunner {
    timeout_secs: u64,
}

impl YtdlpRunner {
    /// Create a runner with the given wall-clock timeout.
    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// Run the command to completion.
    ///
    /// Returns the captured stdout/stderr on exit code 0. A non-zero exit
    /// becomes [`MediaError::ToolFailure`] (or `UpstreamRateLimited` when
    /// the diagnostics indicate HTTP 429).
    pub async fn run(&self, cmd: &YtdlpCommand) -> MediaResult<ToolOutput> {
        which::which(&cmd.program).map_err(|_| MediaError::YtDlpNotFound)?;

        let args = cmd.build_args();
        debug!(program = %cmd.program.display(), "Running: {}", args.join(" "));

        let mut child = Command::new(&cmd.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Drain both pipes concurrently so a chatty tool never deadlocks
        // against a full pipe buffer while we wait on it.
        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let wait = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            child.wait(),
        );

        let status = match wait.await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout_secs,
                    "yt-dlp timed out, killing process"
                );
                let _ = child.kill().await;
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(MediaError::Timeout(self.timeout_secs));
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

        if !status.success() {
            debug!("yt-dlp stderr: {}", stderr);
            return Err(MediaError::from_tool_exit(stderr, status.code()));
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Check that yt-dlp is reachable in PATH.
pub fn check_ytdlp() -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script standing in for yt-dlp.
    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-ytdlp");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{body}").unwrap();
        let mut perms = f.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_build_args_shape() {
        let opts = AntiBlockOptions {
            throttled_rate: Some("1M".to_string()),
            sleep_interval: Some(10),
            max_sleep_interval: Some(30),
            force_ipv4: true,
            geo_bypass: true,
            no_check_certificate: true,
            user_agent: Some("Mozilla/5.0".to_string()),
        };
        let args = YtdlpCommand::new("https://youtu.be/abc123def45")
            .format("bestvideo[height<=720]+bestaudio/best")
            .output("/tmp/out/%(title).200s.%(ext)s")
            .cookies("/tmp/cookies.txt")
            .anti_block(&opts)
            .build_args();

        assert_eq!(args.last().unwrap(), "https://youtu.be/abc123def45");
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--throttled-rate".to_string()));
        assert!(args.contains(&"--force-ipv4".to_string()));
        assert!(args.contains(&"--geo-bypass".to_string()));
        assert!(args.contains(&"--no-check-certificate".to_string()));
        assert!(args.contains(&"--cookies".to_string()));
        let f_pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f_pos + 1], "bestvideo[height<=720]+bestaudio/best");
    }

    #[test]
    fn test_stream_url_and_json_flags() {
        let args = YtdlpCommand::new("u").stream_url_only().build_args();
        assert!(args.contains(&"-g".to_string()));

        let args = YtdlpCommand::new("u").dump_json().build_args();
        assert!(args.contains(&"-J".to_string()));
    }

    #[tokio::test]
    async fn test_runner_captures_stdout() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), r#"echo "[download] Destination: /tmp/x/video.mp4""#);

        let cmd = YtdlpCommand::new("https://youtu.be/abc123def45").program(&tool);
        let out = YtdlpRunner::with_timeout(10).run(&cmd).await.unwrap();
        assert!(out.stdout.contains("[download] Destination: /tmp/x/video.mp4"));
    }

    #[tokio::test]
    async fn test_runner_nonzero_exit_is_tool_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "echo 'ERROR: video unavailable' >&2; exit 1");

        let cmd = YtdlpCommand::new("u").program(&tool);
        let err = YtdlpRunner::with_timeout(10).run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::ToolFailure { .. }));
    }

    #[tokio::test]
    async fn test_runner_detects_upstream_429() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "echo 'HTTP Error 429: Too Many Requests' >&2; exit 1");

        let cmd = YtdlpCommand::new("u").program(&tool);
        let err = YtdlpRunner::with_timeout(10).run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::UpstreamRateLimited));
    }

    #[tokio::test]
    async fn test_runner_kills_on_timeout() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "sleep 30");

        let cmd = YtdlpCommand::new("u").program(&tool);
        let start = std::time::Instant::now();
        let err = YtdlpRunner::with_timeout(1).run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::Timeout(1)));
        assert!(start.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_runner_missing_tool() {
        let cmd = YtdlpCommand::new("u").program("/nonexistent/definitely-missing-tool");
        let err = YtdlpRunner::with_timeout(1).run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::YtDlpNotFound));
    }
}
