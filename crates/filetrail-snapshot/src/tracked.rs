//! Tracked files and the location of their history directories.

use crate::{SnapshotError, SnapshotResult};
use filetrail_util::path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

/// Name of the hidden directory that holds history directories.
pub const HISTORY_DIR_NAME: &str = ".filetrail";

/// Where history directories live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "root")]
pub enum DirectoryMode {
    /// Next to the tracked file: `<dir>/.filetrail/<name>/`.
    #[default]
    CoLocated,
    /// Under the platform's local data directory, mirroring the full path.
    AppData,
    /// Under a user-chosen root, mirroring the full path.
    Custom(PathBuf),
}

impl DirectoryMode {
    /// The root that mirrors full paths, if this mode is centralized.
    fn central_root(&self) -> SnapshotResult<Option<PathBuf>> {
        match self {
            DirectoryMode::CoLocated => Ok(None),
            DirectoryMode::AppData => path::local_data_dir().map(Some).ok_or_else(|| {
                SnapshotError::invalid_path("no local data directory on this platform")
            }),
            DirectoryMode::Custom(root) if root.as_os_str().is_empty() => {
                Err(SnapshotError::invalid_path("custom history root is empty"))
            }
            DirectoryMode::Custom(root) => Ok(Some(root.clone())),
        }
    }
}

/// Resolve the history directory of a file.
///
/// `file` must be absolute. The result is a pure function of the path and the
/// mode; nothing is created.
pub fn resolve_history_dir(file: &Path, mode: &DirectoryMode) -> SnapshotResult<PathBuf> {
    let file_name = file
        .file_name()
        .ok_or_else(|| SnapshotError::invalid_path(format!("{} has no file name", file.display())))?;

    let dir = match mode.central_root()? {
        None => {
            let parent = file.parent().ok_or_else(|| {
                SnapshotError::invalid_path(format!("{} has no parent directory", file.display()))
            })?;
            parent.join(HISTORY_DIR_NAME).join(file_name)
        }
        Some(root) => root.join(HISTORY_DIR_NAME).join(path::without_root(file)),
    };

    Ok(path::long_path(&dir))
}

/// A file whose saves are captured as snapshots.
///
/// This is a view over the filesystem taken when the value is built.
#[derive(Debug, Clone)]
pub struct TrackedFile {
    path: PathBuf,
    exists: bool,
    len: u64,
    modified: Option<SystemTime>,
    history_dir: PathBuf,
}

impl TrackedFile {
    /// Inspect a file and work out its history directory.
    ///
    /// A missing file is not an error; it is reported through [`Self::exists`].
    pub async fn open(file: impl AsRef<Path>, mode: &DirectoryMode) -> SnapshotResult<Self> {
        let file = file.as_ref();
        let path = match fs::canonicalize(file).await {
            Ok(p) => p,
            Err(_) => path::absolute(file)?,
        };
        let history_dir = resolve_history_dir(&path, mode)?;

        let (exists, len, modified) = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => (true, meta.len(), meta.modified().ok()),
            _ => (false, 0, None),
        };

        Ok(Self {
            path,
            exists,
            len,
            modified,
            history_dir,
        })
    }

    /// Inspect the tracked file that a co-located snapshot belongs to.
    pub async fn from_snapshot_path(snapshot_path: &Path) -> SnapshotResult<Self> {
        let source = Self::source_of_snapshot(snapshot_path)?;
        Self::open(source, &DirectoryMode::CoLocated).await
    }

    /// Recover the tracked file from the path of one of its co-located
    /// snapshots: `<dir>/.filetrail/<name>/<snapshot>` -> `<dir>/<name>`.
    pub fn source_of_snapshot(snapshot_path: &Path) -> SnapshotResult<PathBuf> {
        let history_dir = snapshot_path.parent().ok_or_else(|| {
            SnapshotError::invalid_path(format!("{} has no parent", snapshot_path.display()))
        })?;
        let name = history_dir.file_name().ok_or_else(|| {
            SnapshotError::invalid_path(format!("{} has no name", history_dir.display()))
        })?;
        let root = history_dir
            .parent()
            .filter(|p| p.file_name().is_some_and(|n| n == HISTORY_DIR_NAME))
            .ok_or_else(|| {
                SnapshotError::invalid_path(format!(
                    "{} is not inside a {} directory",
                    snapshot_path.display(),
                    HISTORY_DIR_NAME
                ))
            })?;
        let source_dir = root.parent().ok_or_else(|| {
            SnapshotError::invalid_path(format!("{} has no source directory", root.display()))
        })?;
        Ok(source_dir.join(name))
    }

    /// Canonical absolute path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Length in bytes when inspected.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Directory holding this file's snapshots (may not exist yet).
    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    /// File name for display.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Extension of the file, without a dot.
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_co_located_dir() {
        let dir = resolve_history_dir(
            Path::new("/home/me/project/src/main.rs"),
            &DirectoryMode::CoLocated,
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/home/me/project/src/.filetrail/main.rs"));
    }

    #[cfg(unix)]
    #[test]
    fn test_custom_root_mirrors_full_path() {
        let dir = resolve_history_dir(
            Path::new("/home/me/project/src/main.rs"),
            &DirectoryMode::Custom(PathBuf::from("/var/history")),
        )
        .unwrap();
        assert_eq!(
            dir,
            PathBuf::from("/var/history/.filetrail/home/me/project/src/main.rs")
        );
    }

    #[test]
    fn test_empty_custom_root_is_invalid() {
        let err = resolve_history_dir(
            Path::new("/a/b.txt"),
            &DirectoryMode::Custom(PathBuf::new()),
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidPath(_)));
    }

    #[test]
    fn test_root_has_no_history_dir() {
        let err = resolve_history_dir(Path::new("/"), &DirectoryMode::CoLocated).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidPath(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_long_paths_resolve() {
        let segment = "d".repeat(200);
        let mut file = PathBuf::from("/");
        for _ in 0..30 {
            file.push(&segment);
        }
        file.push("deep.txt");
        let dir = resolve_history_dir(&file, &DirectoryMode::CoLocated).unwrap();
        assert!(dir.ends_with(".filetrail/deep.txt"));
        assert!(dir.as_os_str().len() > 6000);
    }

    #[test]
    fn test_source_of_snapshot() {
        let source = TrackedFile::source_of_snapshot(Path::new(
            "/p/src/.filetrail/main.rs/2024-01-01_00_00_00_000.rs",
        ))
        .unwrap();
        assert_eq!(source, PathBuf::from("/p/src/main.rs"));

        assert!(TrackedFile::source_of_snapshot(Path::new(
            "/p/src/other/main.rs/2024-01-01_00_00_00_000.rs"
        ))
        .is_err());
    }

    #[tokio::test]
    async fn test_open_existing_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello").unwrap();

        let tracked = TrackedFile::open(&file, &DirectoryMode::CoLocated)
            .await
            .unwrap();
        assert!(tracked.exists());
        assert_eq!(tracked.len(), 5);
        assert_eq!(tracked.extension(), Some("txt"));
        assert!(tracked.history_dir().ends_with(".filetrail/notes.txt"));
    }

    #[tokio::test]
    async fn test_from_snapshot_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("lib.rs");
        std::fs::write(&file, "fn main() {}").unwrap();
        let snapshot = dir
            .path()
            .join(".filetrail/lib.rs/2024-01-01_00_00_00_000.rs");

        let tracked = TrackedFile::from_snapshot_path(&snapshot).await.unwrap();
        assert!(tracked.exists());
        assert_eq!(tracked.display_name(), "lib.rs");
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let tracked = TrackedFile::open(dir.path().join("gone.rs"), &DirectoryMode::CoLocated)
            .await
            .unwrap();
        assert!(!tracked.exists());
        assert!(tracked.is_empty());
    }
}
