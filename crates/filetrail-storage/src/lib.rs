//! Storage layer for filetrail.
//!
//! Small structured state (such as a history directory's filter settings) is
//! kept next to the data it describes. This crate provides a key-value
//! abstraction with two backends:
//! - JSON file storage rooted at a directory (default)
//! - In-memory storage (for testing)

pub mod error;
pub mod json;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use json::JsonStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A trait for key-value storage backends.
///
/// Keys are represented as path segments, e.g., `[".filter"]`.
/// Values are serialized/deserialized as JSON.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a value from storage.
    ///
    /// Returns `None` if the key doesn't exist.
    async fn read<T: DeserializeOwned + Send>(&self, key: &[&str]) -> StorageResult<Option<T>>;

    /// Write a value to storage.
    ///
    /// Creates parent directories if necessary.
    async fn write<T: Serialize + Send + Sync>(&self, key: &[&str], value: &T)
        -> StorageResult<()>;

    /// Remove a value from storage. Removing a missing key is not an error.
    async fn remove(&self, key: &[&str]) -> StorageResult<()>;

    /// Check if a key exists.
    async fn exists(&self, key: &[&str]) -> StorageResult<bool>;
}
