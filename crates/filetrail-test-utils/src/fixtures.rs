//! Test fixtures for creating reproducible test environments.
//!
//! Provides temporary project directories with tracked files and, optionally,
//! pre-existing snapshot histories laid out the way filetrail stores them
//! (`<dir>/.filetrail/<file name>/<timestamp>.<ext>`).

use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the hidden directory holding histories.
pub const HISTORY_DIR_NAME: &str = ".filetrail";

/// A snapshot to seed before a test runs.
struct SeededSnapshot {
    file: PathBuf,
    stamp: String,
    contents: Vec<u8>,
    compressed: bool,
}

/// A temporary test project with configurable file structure.
///
/// Creates a temporary directory that is automatically cleaned up
/// when the built project is dropped.
///
/// # Example
///
/// ```rust
/// use filetrail_test_utils::fixtures::TestProject;
///
/// let project = TestProject::new()
///     .with_file("notes.txt", "first draft")
///     .with_snapshot("notes.txt", "2024-01-01_09_00_00_000", "empty draft")
///     .with_dir("docs")
///     .build();
///
/// assert!(project.path().join("notes.txt").exists());
/// assert_eq!(project.snapshot_names("notes.txt").len(), 1);
/// ```
pub struct TestProject {
    temp_dir: TempDir,
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: Vec<PathBuf>,
    snapshots: Vec<SeededSnapshot>,
}

impl TestProject {
    /// Create a new test project builder.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: BTreeMap::new(),
            dirs: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    /// Add a file to the project.
    ///
    /// The path should be relative to the project root.
    /// Parent directories are created automatically.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.as_ref().to_vec());
        self
    }

    /// Add an empty directory to the project.
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add a plain snapshot of `file` taken at `stamp`.
    pub fn with_snapshot(
        mut self,
        file: impl AsRef<Path>,
        stamp: &str,
        contents: impl AsRef<[u8]>,
    ) -> Self {
        self.snapshots.push(SeededSnapshot {
            file: file.as_ref().to_path_buf(),
            stamp: stamp.to_string(),
            contents: contents.as_ref().to_vec(),
            compressed: false,
        });
        self
    }

    /// Add a gzip-compressed snapshot of `file` taken at `stamp`.
    pub fn with_compressed_snapshot(
        mut self,
        file: impl AsRef<Path>,
        stamp: &str,
        contents: impl AsRef<[u8]>,
    ) -> Self {
        self.snapshots.push(SeededSnapshot {
            file: file.as_ref().to_path_buf(),
            stamp: stamp.to_string(),
            contents: contents.as_ref().to_vec(),
            compressed: true,
        });
        self
    }

    /// Add a configuration file in the project root.
    pub fn with_config(self, config: &str) -> Self {
        self.with_file("filetrail.json", config)
    }

    /// Build the project, creating all files, directories and snapshots.
    pub fn build(self) -> BuiltTestProject {
        let built = BuiltTestProject {
            temp_dir: self.temp_dir,
        };

        for dir in &self.dirs {
            let full_path = built.path().join(dir);
            fs::create_dir_all(&full_path).unwrap_or_else(|e| {
                panic!("Failed to create directory {}: {}", full_path.display(), e)
            });
        }

        for (path, contents) in &self.files {
            built.write_file(path, contents);
        }

        for snapshot in &self.snapshots {
            let name = snapshot_file_name(
                &snapshot.file,
                &snapshot.stamp,
                snapshot.compressed.then_some(snapshot.contents.len()),
            );
            let target = built.history_dir(&snapshot.file).join(name);
            let bytes = if snapshot.compressed {
                gzip(&snapshot.contents)
            } else {
                snapshot.contents.clone()
            };
            built.write_file(&target, bytes);
        }

        built
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A built test project with files created on disk.
///
/// The temporary directory is automatically cleaned up when this is dropped.
pub struct BuiltTestProject {
    temp_dir: TempDir,
}

impl BuiltTestProject {
    /// Get the path to the project root.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of a project file.
    pub fn file(&self, path: impl AsRef<Path>) -> PathBuf {
        self.path().join(path.as_ref())
    }

    /// Co-located history directory of a project file.
    pub fn history_dir(&self, file: impl AsRef<Path>) -> PathBuf {
        let full_path = self.file(file);
        let name = full_path
            .file_name()
            .unwrap_or_else(|| panic!("{} has no file name", full_path.display()))
            .to_os_string();
        full_path
            .parent()
            .unwrap_or_else(|| panic!("{} has no parent", full_path.display()))
            .join(HISTORY_DIR_NAME)
            .join(name)
    }

    /// File names in a project file's history, oldest first.
    pub fn snapshot_names(&self, file: impl AsRef<Path>) -> Vec<String> {
        let dir = self.history_dir(file);
        if !dir.exists() {
            return Vec::new();
        }
        let mut names: Vec<String> = fs::read_dir(&dir)
            .unwrap_or_else(|e| panic!("Failed to read directory {}: {}", dir.display(), e))
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    /// Read a file from the project.
    pub fn read_file(&self, path: impl AsRef<Path>) -> String {
        let full_path = self.file(path);
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    /// Check if a file exists in the project.
    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.file(path).exists()
    }

    /// Write a file to the project (for modifying during tests).
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let full_path = self.file(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&full_path, contents.as_ref())
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
    }

    /// Delete a file from the project.
    pub fn delete_file(&self, path: impl AsRef<Path>) {
        let full_path = self.file(path);
        fs::remove_file(&full_path)
            .unwrap_or_else(|e| panic!("Failed to delete file {}: {}", full_path.display(), e));
    }
}

/// Snapshot file name for `file` at `stamp`, compressed when `len` is given.
pub fn snapshot_file_name(file: &Path, stamp: &str, len: Option<usize>) -> String {
    let mut name = stamp.to_string();
    if let Some(ext) = file.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    if let Some(len) = len {
        name.push_str(&format!(".{len}.gz"));
    }
    name
}

fn gzip(contents: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(contents)
        .expect("Failed to compress fixture");
    encoder.finish().expect("Failed to compress fixture")
}

/// Common test file contents.
pub mod content {
    /// A log excerpt with an upper-case marker.
    pub const LOG_WITH_ERROR: &str = "2024-01-01 INFO start\n2024-01-01 ERROR disk full\n";

    /// A log excerpt with a lower-case marker.
    pub const LOG_WITH_LOWER_ERROR: &str = "2024-01-01 INFO start\n2024-01-01 error: retrying\n";

    /// A log excerpt without any marker.
    pub const LOG_CLEAN: &str = "2024-01-01 INFO start\n2024-01-01 INFO done\n";

    /// A simple Rust main function.
    pub const RUST_MAIN: &str = r#"fn main() {
    println!("Hello, world!");
}
"#;

    /// Bytes of a given length, for size-based retention tests.
    pub fn filler(len: usize) -> Vec<u8> {
        (0..len).map(|i| b'a' + (i % 26) as u8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_creates_files_and_dirs() {
        let project = TestProject::new()
            .with_file("src/main.rs", content::RUST_MAIN)
            .with_dir("empty")
            .build();

        assert!(project.file_exists("src/main.rs"));
        assert!(project.path().join("empty").is_dir());
        assert_eq!(project.read_file("src/main.rs"), content::RUST_MAIN);
    }

    #[test]
    fn test_seeded_snapshots() {
        let project = TestProject::new()
            .with_file("app.log", content::LOG_CLEAN)
            .with_snapshot("app.log", "2024-01-01_00_00_00_000", content::LOG_WITH_ERROR)
            .with_compressed_snapshot("app.log", "2024-01-02_00_00_00_000", content::LOG_CLEAN)
            .build();

        let names = project.snapshot_names("app.log");
        assert_eq!(
            names,
            vec![
                "2024-01-01_00_00_00_000.log".to_string(),
                format!("2024-01-02_00_00_00_000.log.{}.gz", content::LOG_CLEAN.len()),
            ]
        );
        assert!(project
            .history_dir("app.log")
            .ends_with(".filetrail/app.log"));
    }

    #[test]
    fn test_snapshot_file_name_without_extension() {
        assert_eq!(
            snapshot_file_name(Path::new("Makefile"), "2024-01-01_00_00_00_000", Some(10)),
            "2024-01-01_00_00_00_000.10.gz"
        );
    }

    #[test]
    fn test_filler_length() {
        assert_eq!(content::filler(1000).len(), 1000);
    }
}
