//! Snapshot names and on-disk snapshot records.
//!
//! A snapshot file is named after the moment it was taken plus the tracked
//! file's extension. Compressed snapshots also carry the uncompressed length:
//!
//! ```text
//! 2016-09-12_18_04_47_311.cs
//! 2016-09-12_18_04_47_311.cs.14321.gz
//! 2016-09-12_18_04_47_311            (tracked file without extension)
//! 2016-09-12_18_04_47_311.14321.gz
//! ```

use crate::disk_usage::DiskUsage;
use crate::timestamp::{has_stamp_shape, Stamp, STAMP_LEN};
use crate::SnapshotResult;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

/// Suffix of compressed snapshots.
pub const GZIP_SUFFIX: &str = "gz";

/// A parsed snapshot filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotName {
    /// The 23-character timestamp prefix, kept verbatim.
    key: String,
    /// Extension of the tracked file, without a dot.
    extension: Option<String>,
    /// Uncompressed length for `.gz` snapshots.
    compressed_len: Option<u64>,
}

impl SnapshotName {
    /// Name for a snapshot taken at `stamp`.
    pub fn new(stamp: Stamp, extension: Option<&str>, compressed_len: Option<u64>) -> Self {
        Self {
            key: stamp.to_string(),
            extension: extension.filter(|e| !e.is_empty()).map(str::to_string),
            compressed_len,
        }
    }

    /// Parse a filename. Returns `None` for anything that is not a snapshot,
    /// including the filter side-file and temporary files.
    pub fn parse(file_name: &str) -> Option<Self> {
        if !has_stamp_shape(file_name) {
            return None;
        }
        let key = file_name[..STAMP_LEN].to_string();
        let rest = &file_name[STAMP_LEN..];

        if rest.is_empty() {
            return Some(Self {
                key,
                extension: None,
                compressed_len: None,
            });
        }

        let rest = rest.strip_prefix('.')?;
        let parts: Vec<&str> = rest.split('.').collect();

        match parts.as_slice() {
            [ext] if !ext.is_empty() => Some(Self {
                key,
                extension: Some(ext.to_string()),
                compressed_len: None,
            }),
            [len, gz] if *gz == GZIP_SUFFIX => Some(Self {
                key,
                extension: None,
                compressed_len: Some(len.parse().ok()?),
            }),
            [ext, len, gz] if *gz == GZIP_SUFFIX && !ext.is_empty() => Some(Self {
                key,
                extension: Some(ext.to_string()),
                compressed_len: Some(len.parse().ok()?),
            }),
            _ => None,
        }
    }

    /// The timestamp text, used for ordering and as the filter high-water mark.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The decoded timestamp, if the prefix names a real calendar moment.
    pub fn stamp(&self) -> Option<Stamp> {
        Stamp::parse(&self.key)
    }

    /// Extension of the tracked file.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Whether the content is gzip-compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed_len.is_some()
    }

    /// Uncompressed length recorded in the name, for compressed snapshots.
    pub fn compressed_len(&self) -> Option<u64> {
        self.compressed_len
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        if let Some(ext) = &self.extension {
            write!(f, ".{ext}")?;
        }
        if let Some(len) = self.compressed_len {
            write!(f, ".{len}.{GZIP_SUFFIX}")?;
        }
        Ok(())
    }
}

impl Ord for SnapshotName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl PartialOrd for SnapshotName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One stored copy of a tracked file.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Parsed filename.
    #[serde(serialize_with = "serialize_name")]
    pub name: SnapshotName,

    /// Full path of the snapshot file.
    pub path: PathBuf,

    /// Uncompressed size in bytes.
    pub logical_size: u64,

    /// Bytes charged against the storage limit.
    pub disk_size: u64,

    /// Filesystem modification time.
    #[serde(skip)]
    pub modified: Option<SystemTime>,

    /// Hidden by the active content filter.
    pub filtered: bool,
}

fn serialize_name<S: serde::Serializer>(name: &SnapshotName, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(name)
}

impl Snapshot {
    /// The filename as stored on disk.
    pub fn file_name(&self) -> String {
        self.name.to_string()
    }

    /// Moment used for age checks: the filename timestamp, or the
    /// filesystem modification time when the name does not decode.
    pub fn effective_stamp(&self) -> Option<Stamp> {
        self.name
            .stamp()
            .or_else(|| self.modified.map(Stamp::from_system_time))
    }

    /// Whether the content is gzip-compressed.
    pub fn is_compressed(&self) -> bool {
        self.name.is_compressed()
    }
}

/// Names of the snapshots in a history directory, most recent first.
///
/// Cheaper than [`list_snapshots`] when sizes are not needed.
pub async fn list_snapshot_names(dir: &Path) -> SnapshotResult<Vec<SnapshotName>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str().and_then(SnapshotName::parse) {
            names.push(name);
        }
    }
    names.sort_by(|a, b| b.cmp(a));
    Ok(names)
}

/// List the snapshots in a history directory, most recent first.
///
/// A missing directory has no snapshots. Entries that are not snapshot files
/// are ignored.
pub async fn list_snapshots(dir: &Path, usage: &dyn DiskUsage) -> SnapshotResult<Vec<Snapshot>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let cluster = match fs::metadata(dir).await {
        Ok(meta) => usage.cluster_size(&meta),
        Err(_) => usage.default_cluster_size(),
    };

    let mut snapshots = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(SnapshotName::parse) else {
            continue;
        };

        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "Skipping unreadable snapshot");
                continue;
            }
        };

        let (logical_size, disk_size) = match name.compressed_len() {
            Some(len) => (len, len),
            None => (meta.len(), usage.size_on_disk(&meta, cluster)),
        };

        snapshots.push(Snapshot {
            path: entry.path(),
            name,
            logical_size,
            disk_size,
            modified: meta.modified().ok(),
            filtered: false,
        });
    }

    snapshots.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(snapshots)
}
