//! Download-directory lifecycle: output reservation, serving, cleanup.
//!
//! Every extraction gets its own UUID-named subdirectory, so locating the
//! produced file never depends on a directory-wide recency scan racing
//! against concurrent requests.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures_util::Stream;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};

/// Output naming scheme for downloaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingScheme {
    /// UUID-based names; used by the ephemeral serve-once mode.
    Uuid,
    /// Sanitized `title [id]` names; used by the persistent mode.
    Title,
}

/// A reserved, collision-free output location for one extraction.
#[derive(Debug)]
pub struct OutputSlot {
    /// Per-request subdirectory, exclusively owned by this extraction.
    pub dir: PathBuf,
    /// yt-dlp `-o` template inside the subdirectory.
    pub template: String,
}

impl OutputSlot {
    /// Locate the produced file after a successful tool run.
    ///
    /// The `[download] Destination: ` marker in stdout deterministically
    /// selects the path. When no marker is present (already-merged output,
    /// postprocessed audio), this falls back to the most-recently-modified
    /// file in the slot directory. The fallback is a best-effort heuristic,
    /// safe here only because the directory belongs to this request alone.
    pub fn locate_output(&self, stdout: &str) -> MediaResult<PathBuf> {
        if let Some(path) = parse_destination_marker(stdout) {
            if path.exists() {
                return Ok(path);
            }
            debug!(
                "Destination marker points at missing file {}, falling back to scan",
                path.display()
            );
        }

        newest_file(&self.dir)?.ok_or(MediaError::OutputNotFound)
    }
}

/// Parse the destination marker lines of yt-dlp stdout.
///
/// The last marker wins: with merged formats the tool prints one marker per
/// stream and the merge target is reported last.
pub fn parse_destination_marker(stdout: &str) -> Option<PathBuf> {
    const MARKER: &str = "[download] Destination: ";
    stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(MARKER))
        .map(|rest| PathBuf::from(rest.trim()))
}

/// Most-recently-modified regular file in a directory.
fn newest_file(dir: &Path) -> MediaResult<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let mtime = meta.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| mtime > *t) {
            newest = Some((mtime, entry.path()));
        }
    }
    Ok(newest.map(|(_, p)| p))
}

/// Strip characters that are unsafe in a served filename.
///
/// Path separators and control characters are replaced; leading dots are
/// dropped so a name can never escape the store or hide itself.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim().trim_start_matches('.').to_string()
}

/// Manages the download directory shared by all requests.
#[derive(Debug, Clone)]
pub struct DownloadStore {
    root: PathBuf,
}

impl DownloadStore {
    /// Open (creating if needed) a store over the given root directory.
    pub fn new(root: impl AsRef<Path>) -> MediaResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a fresh per-request output slot.
    ///
    /// Under the UUID scheme the served filename is the video id when one
    /// is known; the slot directory already guarantees uniqueness, so the
    /// slot token is only a fallback stem.
    pub fn reserve(&self, scheme: NamingScheme, video_id: Option<&str>) -> MediaResult<OutputSlot> {
        let token = Uuid::new_v4();
        let dir = self.root.join(token.to_string());
        std::fs::create_dir_all(&dir)?;

        let template = match scheme {
            NamingScheme::Uuid => {
                let stem = video_id
                    .map(sanitize_filename)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| token.to_string());
                dir.join(format!("{stem}.%(ext)s"))
            }
            NamingScheme::Title => dir.join("%(title).200s [%(id)s].%(ext)s"),
        };

        Ok(OutputSlot {
            dir,
            template: template.to_string_lossy().to_string(),
        })
    }

    /// Move a finished download from its slot into the store root, where
    /// `/files/{name}` can serve it, and drop the now-empty slot directory.
    ///
    /// A plain rename is tried first; EXDEV falls back to copy-and-rename so
    /// the temp directory and the store may live on different filesystems.
    pub async fn publish(&self, slot: &OutputSlot, file: &Path) -> MediaResult<PathBuf> {
        let name = file
            .file_name()
            .map(|n| sanitize_filename(&n.to_string_lossy()))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| MediaError::InvalidOutput("output has no filename".into()))?;
        let dst = self.root.join(name);

        match tokio::fs::rename(file, &dst).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                copy_then_remove(file, &dst).await?;
            }
            Err(e) => return Err(MediaError::from(e)),
        }

        let _ = tokio::fs::remove_dir(&slot.dir).await;
        Ok(dst)
    }

    /// Resolve a client-supplied name to a file in the store root.
    pub fn resolve(&self, name: &str) -> MediaResult<PathBuf> {
        let safe = sanitize_filename(name);
        if safe.is_empty() {
            return Err(MediaError::FileNotFound(PathBuf::from(name)));
        }
        let path = self.root.join(&safe);
        if path.is_file() {
            Ok(path)
        } else {
            Err(MediaError::FileNotFound(path))
        }
    }

    /// Delete files older than `max_age`, returning the count deleted.
    ///
    /// Walks the root and the per-request subdirectories one level deep.
    /// Individual failures (including a file already removed by a racing
    /// sweep) are skipped, never fatal; empty slot directories are pruned.
    pub fn cleanup_older_than(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut deleted = 0;

        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return 0;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Ok(children) = std::fs::read_dir(&path) {
                    for child in children.flatten() {
                        deleted += remove_if_expired(&child.path(), now, max_age);
                    }
                }
                // Prune the slot directory once it's empty.
                let _ = std::fs::remove_dir(&path);
            } else {
                deleted += remove_if_expired(&path, now, max_age);
            }
        }

        deleted
    }
}

/// Fallback for a rename that crosses filesystems: copy via a `.part`
/// sibling, swap it into place, then drop the source.
async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp = dst.with_extension("part");
    tokio::fs::copy(src, &tmp).await?;
    tokio::fs::rename(&tmp, dst).await.inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })?;
    if let Err(e) = tokio::fs::remove_file(src).await {
        warn!("Failed to remove source after cross-device move: {}", e);
    }
    Ok(())
}

/// Delete one regular file if its mtime age exceeds `max_age`. Returns 1 on
/// successful deletion, 0 otherwise.
fn remove_if_expired(path: &Path, now: SystemTime, max_age: Duration) -> usize {
    let Ok(meta) = std::fs::metadata(path) else {
        return 0; // already gone
    };
    if !meta.is_file() {
        return 0;
    }
    let expired = meta
        .modified()
        .ok()
        .and_then(|mtime| now.duration_since(mtime).ok())
        .is_some_and(|age| age > max_age);
    if !expired {
        return 0;
    }
    match std::fs::remove_file(path) {
        Ok(()) => 1,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => {
            warn!("Failed to delete {}: {}", path.display(), e);
            0
        }
    }
}

/// A file streamed to exactly one client and deleted afterwards.
///
/// Deletion happens in `Drop`, which runs once on every exit path: body
/// fully sent, client abort, or handler error. The per-request slot
/// directory is removed along with the file.
pub struct EphemeralFile {
    stream: ReaderStream<File>,
    path: PathBuf,
    slot_dir: Option<PathBuf>,
}

impl EphemeralFile {
    /// Open the file for single-shot serving.
    pub async fn open(path: impl AsRef<Path>, slot_dir: Option<PathBuf>) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|_| MediaError::FileNotFound(path.clone()))?;
        Ok(Self {
            stream: ReaderStream::new(file),
            path,
            slot_dir,
        })
    }
}

impl Stream for EphemeralFile {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

impl Drop for EphemeralFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to delete ephemeral file {}: {}", self.path.display(), e);
            }
        }
        if let Some(dir) = &self.slot_dir {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_parse_destination_marker() {
        let stdout = "\
[youtube] abc: Downloading webpage
[download] Destination: /tmp/x/video.f137.mp4
[download] Destination: /tmp/x/video.mp4
[download] 100% of 10MiB";
        assert_eq!(
            parse_destination_marker(stdout),
            Some(PathBuf::from("/tmp/x/video.mp4"))
        );
        assert_eq!(parse_destination_marker("no marker here"), None);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("video.mp4"), "video.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("a/b\\c:d.mp4"), "a_b_c_d.mp4");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("title [abc123def45].mp4"), "title [abc123def45].mp4");
    }

    #[test]
    fn test_reserve_is_collision_free() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();

        let a = store.reserve(NamingScheme::Uuid, None).unwrap();
        let b = store.reserve(NamingScheme::Uuid, None).unwrap();
        assert_ne!(a.dir, b.dir);
        assert!(a.dir.is_dir());
        assert!(a.template.ends_with(".%(ext)s"));

        let t = store.reserve(NamingScheme::Title, None).unwrap();
        assert!(t.template.contains("%(title).200s"));
    }

    #[test]
    fn test_reserve_names_uuid_slot_after_video_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();

        let slot = store.reserve(NamingScheme::Uuid, Some("abc123def45")).unwrap();
        assert!(slot.template.ends_with("abc123def45.%(ext)s"));

        // A hostile id never escapes the slot; an empty one falls back.
        let slot = store.reserve(NamingScheme::Uuid, Some("../x")).unwrap();
        assert!(slot.template.ends_with("_x.%(ext)s"));
        assert!(!slot.template.contains(".."));
        let slot = store.reserve(NamingScheme::Uuid, Some("...")).unwrap();
        assert!(!slot.template.contains("..."));
    }

    #[tokio::test]
    async fn test_copy_then_remove_moves_across_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("a").join("video.mp4");
        let dst = dir.path().join("b").join("video.mp4");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&src, b"data").unwrap();

        copy_then_remove(&src, &dst).await.unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"data");
        assert!(!src.exists());
        assert!(!dst.with_extension("part").exists());
    }

    #[test]
    fn test_locate_output_prefers_marker() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();
        let slot = store.reserve(NamingScheme::Uuid, None).unwrap();

        let marked = slot.dir.join("video.mp4");
        let other = slot.dir.join("other.mp4");
        std::fs::write(&marked, b"a").unwrap();
        std::fs::write(&other, b"b").unwrap();

        let stdout = format!("[download] Destination: {}\n", marked.display());
        assert_eq!(slot.locate_output(&stdout).unwrap(), marked);
    }

    #[test]
    fn test_locate_output_falls_back_to_newest() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();
        let slot = store.reserve(NamingScheme::Uuid, None).unwrap();

        let old = slot.dir.join("old.mp4");
        std::fs::write(&old, b"a").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let new = slot.dir.join("new.mp4");
        std::fs::write(&new, b"b").unwrap();

        assert_eq!(slot.locate_output("no marker").unwrap(), new);
    }

    #[test]
    fn test_locate_output_empty_slot_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();
        let slot = store.reserve(NamingScheme::Uuid, None).unwrap();
        assert!(matches!(
            slot.locate_output(""),
            Err(MediaError::OutputNotFound)
        ));
    }

    #[tokio::test]
    async fn test_publish_moves_into_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();
        let slot = store.reserve(NamingScheme::Title, None).unwrap();

        let file = slot.dir.join("title [abc123def45].mp4");
        std::fs::write(&file, b"data").unwrap();

        let published = store.publish(&slot, &file).await.unwrap();
        assert_eq!(published, dir.path().join("title [abc123def45].mp4"));
        assert!(published.is_file());
        assert!(!slot.dir.exists(), "empty slot dir should be pruned");
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("ok.mp4"), b"x").unwrap();

        assert!(store.resolve("ok.mp4").is_ok());
        assert!(store.resolve("../ok.mp4").is_err());
        assert!(store.resolve("missing.mp4").is_err());
        assert!(store.resolve("").is_err());
    }

    #[test]
    fn test_cleanup_deletes_only_expired_and_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();

        std::fs::write(dir.path().join("old.mp4"), b"x").unwrap();
        let slot = store.reserve(NamingScheme::Uuid, None).unwrap();
        std::fs::write(slot.dir.join("nested.mp4"), b"y").unwrap();

        std::thread::sleep(Duration::from_millis(50));

        // Everything written above is now older than a zero threshold.
        assert_eq!(store.cleanup_older_than(Duration::ZERO), 2);
        assert_eq!(store.cleanup_older_than(Duration::ZERO), 0);

        // Fresh files survive a realistic threshold.
        std::fs::write(dir.path().join("fresh.mp4"), b"z").unwrap();
        assert_eq!(store.cleanup_older_than(Duration::from_secs(3600)), 0);
        assert!(dir.path().join("fresh.mp4").exists());
    }

    #[tokio::test]
    async fn test_ephemeral_file_deleted_after_full_stream() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DownloadStore::new(dir.path()).unwrap();
        let slot = store.reserve(NamingScheme::Uuid, None).unwrap();
        let path = slot.dir.join("video.mp4");
        std::fs::write(&path, b"payload").unwrap();

        let mut stream = EphemeralFile::open(&path, Some(slot.dir.clone())).await.unwrap();
        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 7);
        assert!(path.exists(), "file must survive until the stream is dropped");

        drop(stream);
        assert!(!path.exists());
        assert!(!slot.dir.exists());
    }

    #[tokio::test]
    async fn test_ephemeral_file_deleted_on_early_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"payload").unwrap();

        let stream = EphemeralFile::open(&path, None).await.unwrap();
        drop(stream); // client aborted before any bytes were read
        assert!(!path.exists());
    }
}
