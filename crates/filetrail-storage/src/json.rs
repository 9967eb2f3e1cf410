//! JSON file-based storage implementation.
//!
//! Each key is stored as a separate JSON file below a base directory.
//! Keys are mapped to file paths: `[".filter"]` -> `<base>/.filter.json`.

use crate::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// JSON file-based storage.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    base_path: PathBuf,
}

impl JsonStorage {
    /// Create a new JSON storage at the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// The directory this storage writes into.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a key.
    pub fn key_to_path(&self, key: &[&str]) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::invalid_key("Key cannot be empty"));
        }

        // Validate key components (no path traversal)
        for component in key {
            if component.is_empty()
                || component.contains('/')
                || component.contains('\\')
                || *component == "."
                || *component == ".."
            {
                return Err(StorageError::invalid_key(format!(
                    "Invalid key component: {}",
                    component
                )));
            }
        }

        let mut path = self.base_path.clone();
        for component in &key[..key.len() - 1] {
            path.push(component);
        }
        // Appended rather than `set_extension` so dotted names keep every segment.
        path.push(format!("{}.json", key[key.len() - 1]));

        Ok(path)
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn read<T: DeserializeOwned + Send>(&self, key: &[&str]) -> StorageResult<Option<T>> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Reading from storage");

        match fs::read_to_string(&path).await {
            Ok(content) => {
                let value: T = serde_json::from_str(&content)?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write<T: Serialize + Send + Sync>(
        &self,
        key: &[&str],
        value: &T,
    ) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Writing to storage");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(value)?;

        // Write atomically (write to temp file, then rename)
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn remove(&self, key: &[&str]) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Removing from storage");

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, key: &[&str]) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }
}
