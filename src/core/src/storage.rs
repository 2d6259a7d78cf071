//! Storage subsystem
//!
//! Key-value persistence for the console: the logged-in user, the activity
//! log and record exports.
//!
//! Components:
//! - `storage_trait`: the Storage trait and the key grammar.
//! - `file_storage`: one file per key, for simple persistence and inspection.
//! - `database_storage`: SQLite implementation using SeaORM.
//! - `db_entities`: SeaORM entity model for the database backend.

pub mod database_storage;
pub mod db_entities;
pub mod file_storage;
pub mod storage_trait;

use std::sync::Arc;

use log::error;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::configuration::{StorageBackend, StorageSettings};
use crate::error_handling::types::StorageError;

pub use database_storage::DatabaseStorage;
pub use file_storage::FileStorage;
pub use storage_trait::Storage;

/// Builds the backend selected in the configuration.
pub async fn open_storage(settings: &StorageSettings) -> Result<Arc<dyn Storage>, StorageError> {
    match settings.backend {
        StorageBackend::File => Ok(Arc::new(FileStorage::new(&settings.path)?)),
        StorageBackend::Database => Ok(Arc::new(DatabaseStorage::open(&settings.path).await?)),
    }
}

pub async fn save_json<T: Serialize + ?Sized>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let text = serde_json::to_string(value).map_err(|e| {
        error!("Failed to serialize {}: {}", key, e);
        StorageError::SerializationFailed(e.to_string())
    })?;
    storage.put(key, &text).await
}

/// Reads and decodes `key`; `Ok(None)` when absent.
pub async fn load_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match storage.get(key).await? {
        Some(text) => serde_json::from_str(&text).map(Some).map_err(|e| {
            error!("Failed to decode {}: {}", key, e);
            StorageError::SerializationFailed(e.to_string())
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
pub(crate) mod mem_storage {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::storage_trait::{key_segments, Storage};
    use crate::error_handling::types::StorageError;

    /// In-memory mock used by tests across the crate.
    #[derive(Default)]
    pub struct MemStorage {
        entries: Mutex<BTreeMap<String, String>>,
    }

    impl MemStorage {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl Storage for MemStorage {
        async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
            key_segments(key)?;
            self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn keys(&self) -> Result<Vec<String>, StorageError> {
            Ok(self.entries.lock().unwrap().keys().cloned().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mem_storage::MemStorage;
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn json_helpers_roundtrip_and_report_bad_payloads() {
        let storage = MemStorage::new();
        let mut counts = HashMap::new();
        counts.insert("TCP".to_string(), 3u32);

        save_json(&storage, "counts", &counts).await.unwrap();
        let loaded: Option<HashMap<String, u32>> = load_json(&storage, "counts").await.unwrap();
        assert_eq!(loaded, Some(counts));

        let missing: Option<Vec<u8>> = load_json(&storage, "absent").await.unwrap();
        assert!(missing.is_none());

        storage.put("broken", "{").await.unwrap();
        let broken: Result<Option<Vec<u8>>, _> = load_json(&storage, "broken").await;
        assert!(matches!(broken, Err(StorageError::SerializationFailed(_))));
    }

    #[tokio::test]
    async fn open_storage_honours_backend() {
        let dir = tempfile::tempdir().unwrap();
        let file_settings = StorageSettings {
            backend: StorageBackend::File,
            path: dir.path().join("files"),
        };
        let storage = open_storage(&file_settings).await.unwrap();
        storage.put("k", "v").await.unwrap();
        assert!(dir.path().join("files").join("k").is_file());

        let db_settings = StorageSettings {
            backend: StorageBackend::Database,
            path: dir.path().join("rampart.sqlite3"),
        };
        let storage = open_storage(&db_settings).await.unwrap();
        storage.put("k", "v").await.unwrap();
        assert!(dir.path().join("rampart.sqlite3").is_file());
    }
}
