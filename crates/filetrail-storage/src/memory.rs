//! In-memory storage implementation for testing.

use crate::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for testing.
///
/// This stores all data in memory and is not persistent.
pub struct MemoryStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert a key slice to a storage key string.
    fn key_to_string(key: &[&str]) -> StorageResult<String> {
        if key.is_empty() {
            return Err(StorageError::invalid_key("Key cannot be empty"));
        }
        Ok(key.join("/"))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read<T: DeserializeOwned + Send>(&self, key: &[&str]) -> StorageResult<Option<T>> {
        let key_str = Self::key_to_string(key)?;
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        match data.get(&key_str) {
            Some(json) => {
                let value: T = serde_json::from_str(json)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn write<T: Serialize + Send + Sync>(
        &self,
        key: &[&str],
        value: &T,
    ) -> StorageResult<()> {
        let key_str = Self::key_to_string(key)?;
        let json = serde_json::to_string(value)?;

        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        data.insert(key_str, json);

        Ok(())
    }

    async fn remove(&self, key: &[&str]) -> StorageResult<()> {
        let key_str = Self::key_to_string(key)?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        data.remove(&key_str);
        Ok(())
    }

    async fn exists(&self, key: &[&str]) -> StorageResult<bool> {
        let key_str = Self::key_to_string(key)?;
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        Ok(data.contains_key(&key_str))
    }
}
