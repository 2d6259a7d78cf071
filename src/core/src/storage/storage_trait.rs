//! Storage Trait
//!
//! Key-value blob store used for the session user, the activity log and
//! record exports. Values are UTF-8 text, in practice JSON documents.
//!
//! Keys are made of `/`-separated segments of ASCII letters, digits, `.`,
//! `_` and `-` (for example `session.user` or `exports/records-1.json`).

use async_trait::async_trait;

use crate::error_handling::types::StorageError;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Reads the value under `key`; `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Deletes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored, sorted.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Checks `key` against the key grammar and returns its segments.
pub fn key_segments(key: &str) -> Result<Vec<&str>, StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let segments: Vec<&str> = key.split('/').collect();
    for segment in &segments {
        let valid_chars = segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if segment.is_empty() || *segment == "." || *segment == ".." || !valid_chars {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
    }
    Ok(segments)
}
