//! Key/value storage backends.
//!
//! DESIGN
//! ======
//! The session layer persists into two stores with different lifetimes: a
//! durable one shared by every tab of an origin and surviving restarts, and
//! an ephemeral one private to a single tab. Both sit behind the same
//! `KeyValueStore` trait so the record store never knows which engine it
//! is talking to.
//!
//! Every write replaces the whole value for its key. No cross-tab locking is
//! attempted; readers that may have raced a writer re-validate with the server.

mod file;

pub use file::FileStore;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Failures raised by a storage backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The backend refused access (quota, privacy mode, missing directory).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Reading or writing the backing medium failed.
    #[error("storage I/O failed: {0}")]
    Io(String),

    /// Persisted bytes could not be encoded or decoded.
    #[error("storage serialization failed: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::Unavailable(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// String-keyed, string-valued store. Enables swapping engines in tests.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend rejects the write.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend rejects the delete.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-process store. Used as the per-tab ephemeral store: dropping it is
/// closing the tab.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek for diagnostics.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}
