//! Durable store backed by a directory, one file per key.
//!
//! Several stores pointed at the same directory (several tabs of one origin)
//! observe each other's writes, and each key is an independent record: a
//! write replaces exactly one file, so concurrent writers to different keys
//! never disturb each other and concurrent writers to one key resolve
//! last-writer-wins. Every write goes to a uniquely named sibling temp file
//! that is renamed over the record, so a reader never sees a half-written
//! value.
//!
//! LAYOUT
//! ======
//! `<dir>/<escaped key>.kv`. ASCII alphanumerics, `-`, `_` and non-leading
//! `.` are kept; every other byte becomes `%XX`. Temp files start with `.`
//! and end in `.tmp`, so they never collide with a record.
//!
//! ERROR HANDLING
//! ==============
//! A record that is not UTF-8 fails reads with `StorageError::Serialization`.
//! Writes replace it like any other value.

use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::warn;

use super::{KeyValueStore, StorageError};

const RECORD_EXT: &str = "kv";

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXT}", escape_key(key)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let nonce: u64 = rand::rng().random();
        self.dir.join(format!(".{}.{nonce:016x}.tmp", escape_key(key)))
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, b) in key.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0);
        if keep {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read(self.record_path(key)).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(format!("record {key:?} is not UTF-8: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.temp_path(key);
        tokio::fs::write(&tmp, value.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.record_path(key)).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp record");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;
