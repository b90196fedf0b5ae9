//! Durable key/value storage for the refresh token and the cookie jar.

use dashmap::DashMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Storage that outlives the process (browser local storage analogue).
pub trait DurableStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage, used by tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON file storage. Every write rewrites the whole file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open `path`, loading existing entries if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let map: HashMap<String, String> = serde_json::from_reader(reader)?;
            tracing::debug!(path = %path.display(), entries = map.len(), "Loaded session storage");
            map
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(writer, entries)?;
        Ok(())
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.get("k").is_none());
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").as_deref(), Some("v"));
        storage.remove("k").unwrap();
        assert!(storage.get("k").is_none());
    }

    #[test]
    fn test_file_storage_persistence() {
        let path = std::env::temp_dir().join(format!("edge-storage-{}.json", uuid::Uuid::new_v4()));

        let storage = FileStorage::open(&path).unwrap();
        storage.set("refresh_token", "r1").unwrap();
        storage.set("other", "x").unwrap();
        storage.remove("other").unwrap();

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("refresh_token").as_deref(), Some("r1"));
        assert!(reopened.get("other").is_none());

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_file_storage_rejects_garbage() {
        let path = std::env::temp_dir().join(format!("edge-storage-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(FileStorage::open(&path), Err(StorageError::Encoding(_))));
        std::fs::remove_file(&path).unwrap_or_default();
    }
}
