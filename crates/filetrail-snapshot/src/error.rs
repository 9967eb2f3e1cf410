//! Snapshot error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
///
/// Conditions that are merely skipped (empty source, saving too often, an
/// identical snapshot already on disk) are not errors; see
/// [`crate::SkipReason`].
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Filter state could not be read or written.
    #[error("Filter state error: {0}")]
    Storage(#[from] filetrail_storage::StorageError),

    /// The history directory for a file cannot be determined.
    #[error("Cannot resolve history directory: {0}")]
    InvalidPath(String),

    /// An existing snapshot disagrees with the file it should be a copy of.
    #[error("Snapshot {path} holds {actual} bytes but the source has {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// A name does not follow the snapshot filename grammar.
    #[error("Invalid snapshot name: {0}")]
    InvalidName(String),

    /// Snapshot not found.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// A filter term could not be compiled.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Compressing or decompressing a snapshot failed.
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Operation failed.
    #[error("Snapshot operation failed: {0}")]
    OperationFailed(String),
}

impl SnapshotError {
    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create an invalid path error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath(message.into())
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(message.into())
    }

    /// Whether this is a consistency fault (existing history is corrupt).
    pub fn is_consistency_fault(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. })
    }
}

impl From<tokio::task::JoinError> for SnapshotError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::OperationFailed(format!("background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_mismatch_is_consistency_fault() {
        let err = SnapshotError::SizeMismatch {
            path: PathBuf::from("2024-01-01_00_00_00_000.rs"),
            expected: 10,
            actual: 7,
        };
        assert!(err.is_consistency_fault());
        assert!(err.to_string().contains("holds 7 bytes"));
    }

    #[test]
    fn io_error_is_not_consistency_fault() {
        let err = SnapshotError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "locked",
        ));
        assert!(!err.is_consistency_fault());
        assert!(err.to_string().starts_with("IO error"));
    }

    #[test]
    fn invalid_path_formats_message() {
        let err = SnapshotError::invalid_path("no parent directory");
        assert_eq!(
            err.to_string(),
            "Cannot resolve history directory: no parent directory"
        );
    }
}
