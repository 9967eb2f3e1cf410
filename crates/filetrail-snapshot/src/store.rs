//! Snapshot creation and retrieval.

use crate::disk_usage::{DiskUsage, FsDiskUsage};
use crate::policy::RetentionPolicy;
use crate::snapshot::{list_snapshots, Snapshot, SnapshotName};
use crate::timestamp::Stamp;
use crate::tracked::{resolve_history_dir, DirectoryMode, TrackedFile};
use crate::{SnapshotError, SnapshotResult};
use filetrail_util::{path, TimingGuard};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use similar::{ChangeTag, TextDiff};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Why a save did not produce a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The tracked file does not exist.
    Missing,
    /// The tracked file is empty.
    Empty,
    /// The latest snapshot is more recent than the minimum save interval.
    TooSoon { elapsed: Duration, interval: Duration },
    /// An identical snapshot with the same timestamp already exists.
    Duplicate,
    /// The clock reads earlier than the latest snapshot.
    ClockSkew,
    /// Reading, compressing or writing the content failed; retried on the next save.
    CopyFailed,
}

/// Result of a save request.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Snapshot),
    Skipped(SkipReason),
}

impl CreateOutcome {
    pub fn created(&self) -> Option<&Snapshot> {
        match self {
            CreateOutcome::Created(snapshot) => Some(snapshot),
            CreateOutcome::Skipped(_) => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Creates and reads the snapshots of tracked files.
///
/// Snapshots of one file live in its history directory:
/// ```text
/// src/
///   main.rs
///   .filetrail/
///     main.rs/
///       2024-03-01_09_15_02_114.rs
///       2024-03-01_09_41_57_003.rs.48211.gz
///       .filter.json
/// ```
#[derive(Clone)]
pub struct SnapshotStore {
    usage: Arc<dyn DiskUsage>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}

impl SnapshotStore {
    /// A store that measures disk usage on the real filesystem.
    pub fn new() -> Self {
        Self::with_disk_usage(Arc::new(FsDiskUsage))
    }

    /// A store with a custom storage-size oracle.
    pub fn with_disk_usage(usage: Arc<dyn DiskUsage>) -> Self {
        Self { usage }
    }

    pub fn disk_usage(&self) -> &dyn DiskUsage {
        self.usage.as_ref()
    }

    /// Snapshots of a tracked file, most recent first.
    pub async fn list(&self, tracked: &TrackedFile) -> SnapshotResult<Vec<Snapshot>> {
        list_snapshots(tracked.history_dir(), self.usage.as_ref()).await
    }

    /// Find a snapshot by its timestamp (or full file name).
    pub async fn find(&self, tracked: &TrackedFile, id: &str) -> SnapshotResult<Snapshot> {
        self.list(tracked)
            .await?
            .into_iter()
            .find(|s| s.name.key() == id || s.file_name() == id)
            .ok_or_else(|| SnapshotError::not_found(id))
    }

    /// Capture the tracked file's current content, stamped with the current time.
    pub async fn create(
        &self,
        tracked: &TrackedFile,
        policy: &RetentionPolicy,
    ) -> SnapshotResult<CreateOutcome> {
        self.create_at(tracked, policy, Stamp::now()).await
    }

    /// Capture the tracked file's current content under a given timestamp.
    pub async fn create_at(
        &self,
        tracked: &TrackedFile,
        policy: &RetentionPolicy,
        stamp: Stamp,
    ) -> SnapshotResult<CreateOutcome> {
        let mut timing = TimingGuard::snapshot(tracked.display_name());

        if !tracked.exists() {
            debug!(path = %tracked.path().display(), "Skipping missing file");
            return Ok(CreateOutcome::Skipped(SkipReason::Missing));
        }

        let content = match fs::read(tracked.path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %tracked.path().display(), "Skipping missing file");
                return Ok(CreateOutcome::Skipped(SkipReason::Missing));
            }
            Err(e) => {
                warn!(path = %tracked.path().display(), error = %e, "Failed to read file for snapshot");
                return Ok(CreateOutcome::Skipped(SkipReason::CopyFailed));
            }
        };
        if content.is_empty() {
            debug!(path = %tracked.path().display(), "Skipping empty file");
            return Ok(CreateOutcome::Skipped(SkipReason::Empty));
        }
        let len = content.len() as u64;

        let existing = self.list(tracked).await?;
        if let Some(latest) = existing.first() {
            if let Some(skip) = self.check_latest(latest, stamp, len, policy)? {
                return Ok(CreateOutcome::Skipped(skip));
            }
        }

        let dir = tracked.history_dir();
        fs::create_dir_all(dir).await?;

        let compress = policy.compresses(len);
        let name = SnapshotName::new(stamp, tracked.extension(), compress.then_some(len));
        let target = dir.join(name.to_string());

        let bytes = if compress {
            match gzip(content).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %tracked.path().display(), error = %e, "Failed to compress snapshot");
                    return Ok(CreateOutcome::Skipped(SkipReason::CopyFailed));
                }
            }
        } else {
            content
        };

        match write_new(&target, &bytes).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return self.resolve_collision(&target, &name, len).await;
            }
            Err(e) => {
                warn!(path = %target.display(), error = %e, "Failed to write snapshot");
                if let Err(e) = fs::remove_file(&target).await {
                    debug!(path = %target.display(), error = %e, "No partial snapshot to remove");
                }
                return Ok(CreateOutcome::Skipped(SkipReason::CopyFailed));
            }
        }

        let meta = fs::metadata(&target).await?;
        let disk_size = if compress {
            len
        } else {
            let cluster = match fs::metadata(dir).await {
                Ok(dir_meta) => self.usage.cluster_size(&dir_meta),
                Err(_) => self.usage.default_cluster_size(),
            };
            self.usage.size_on_disk(&meta, cluster)
        };

        timing.record(len);
        info!(
            file = %tracked.display_name(),
            snapshot = %name,
            bytes = len,
            compressed = compress,
            "Created snapshot"
        );

        Ok(CreateOutcome::Created(Snapshot {
            name,
            path: target,
            logical_size: len,
            disk_size,
            modified: meta.modified().ok(),
            filtered: false,
        }))
    }

    /// Decide whether the latest snapshot rules out a new one at `stamp`.
    fn check_latest(
        &self,
        latest: &Snapshot,
        stamp: Stamp,
        len: u64,
        policy: &RetentionPolicy,
    ) -> SnapshotResult<Option<SkipReason>> {
        if latest.name.key() == stamp.to_string() {
            if latest.logical_size != len {
                return Err(SnapshotError::SizeMismatch {
                    path: latest.path.clone(),
                    expected: len,
                    actual: latest.logical_size,
                });
            }
            debug!(snapshot = %latest.name, "Snapshot already taken");
            return Ok(Some(SkipReason::Duplicate));
        }

        let Some(latest_stamp) = latest.name.stamp() else {
            return Ok(None);
        };
        let Ok(elapsed) = latest_stamp.until(stamp).to_std() else {
            warn!(
                latest = %latest.name,
                now = %stamp,
                "Clock is behind the latest snapshot, skipping"
            );
            return Ok(Some(SkipReason::ClockSkew));
        };

        if let Some(interval) = policy.min_save_interval() {
            if elapsed < interval {
                debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_secs = interval.as_secs(),
                    "Saved too recently, skipping"
                );
                return Ok(Some(SkipReason::TooSoon { elapsed, interval }));
            }
        }
        Ok(None)
    }

    /// Another writer created `target` first.
    async fn resolve_collision(
        &self,
        target: &Path,
        name: &SnapshotName,
        len: u64,
    ) -> SnapshotResult<CreateOutcome> {
        let actual = match name.compressed_len() {
            Some(recorded) => recorded,
            None => fs::metadata(target).await?.len(),
        };
        if actual != len {
            return Err(SnapshotError::SizeMismatch {
                path: target.to_path_buf(),
                expected: len,
                actual,
            });
        }
        debug!(snapshot = %name, "Snapshot already taken");
        Ok(CreateOutcome::Skipped(SkipReason::Duplicate))
    }

    /// Uncompressed content of a snapshot.
    pub async fn read_content(&self, snapshot: &Snapshot) -> SnapshotResult<Vec<u8>> {
        read_snapshot(&snapshot.path, snapshot.is_compressed()).await
    }

    /// Write a snapshot's uncompressed content to `dest`.
    pub async fn extract(&self, snapshot: &Snapshot, dest: &Path) -> SnapshotResult<()> {
        let content = self.read_content(snapshot).await?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(dest, &content).await?;
        debug!(snapshot = %snapshot.name, dest = %dest.display(), "Extracted snapshot");
        Ok(())
    }

    /// Replace the tracked file's content with a snapshot's.
    pub async fn restore(&self, tracked: &TrackedFile, snapshot: &Snapshot) -> SnapshotResult<()> {
        let content = self.read_content(snapshot).await?;
        fs::write(tracked.path(), &content).await.map_err(|e| {
            SnapshotError::operation_failed(format!(
                "Failed to restore {}: {}",
                tracked.path().display(),
                e
            ))
        })?;
        info!(file = %tracked.display_name(), snapshot = %snapshot.name, "Restored snapshot");
        Ok(())
    }

    /// Unified diff from a snapshot to the tracked file's current content.
    /// Empty when the two are identical.
    pub async fn diff(&self, tracked: &TrackedFile, snapshot: &Snapshot) -> SnapshotResult<String> {
        let old = self.read_content(snapshot).await?;
        let new = match fs::read(tracked.path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if old == new {
            return Ok(String::new());
        }
        Ok(generate_diff(
            &String::from_utf8_lossy(&old),
            &String::from_utf8_lossy(&new),
            &snapshot.file_name(),
            &tracked.display_name(),
        ))
    }

    /// Move a file's history along with a rename inside the same directory.
    ///
    /// Returns the new history directory, or `None` when there was nothing to
    /// move or the file changed directory.
    pub async fn rename(
        &self,
        old_path: &Path,
        new_path: &Path,
        mode: &DirectoryMode,
    ) -> SnapshotResult<Option<PathBuf>> {
        let old_path = path::absolute(old_path)?;
        let new_path = path::absolute(new_path)?;
        if old_path.parent() != new_path.parent() {
            debug!(
                from = %old_path.display(),
                to = %new_path.display(),
                "File moved to another directory, history stays"
            );
            return Ok(None);
        }

        let old_dir = resolve_history_dir(&old_path, mode)?;
        let new_dir = resolve_history_dir(&new_path, mode)?;
        if !fs::try_exists(&old_dir).await? {
            return Ok(None);
        }
        if fs::try_exists(&new_dir).await? {
            return Err(SnapshotError::operation_failed(format!(
                "History for {} already exists",
                new_path.display()
            )));
        }

        fs::rename(&old_dir, &new_dir).await?;
        info!(from = %old_dir.display(), to = %new_dir.display(), "Moved history");
        Ok(Some(new_dir))
    }
}

/// Read a snapshot file, decompressing if needed.
pub(crate) async fn read_snapshot(path: &Path, compressed: bool) -> SnapshotResult<Vec<u8>> {
    let raw = fs::read(path).await?;
    if !compressed {
        return Ok(raw);
    }
    gunzip(raw).await
}

async fn gzip(content: Vec<u8>) -> SnapshotResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&content)?;
        encoder.finish()
    })
    .await?
    .map_err(|e| SnapshotError::Compression(e.to_string()))
}

async fn gunzip(raw: Vec<u8>) -> SnapshotResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut content = Vec::new();
        decoder.read_to_end(&mut content)?;
        Ok::<_, std::io::Error>(content)
    })
    .await?
    .map_err(|e| SnapshotError::Compression(e.to_string()))
}

/// Create `path` exclusively and write `bytes` to it.
async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Generate a unified diff between two strings.
fn generate_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&format!("--- {}\n", old_label));
    output.push_str(&format!("+++ {}\n", new_label));

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }

        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };

                output.push_str(sign);
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }

    output
}
