// crates/store/src/file.rs
//! One JSON file per key under a data directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{KvStore, StoreError};

/// File-backed store. Writes go to a temp file first and are renamed into
/// place, so a crash mid-write never leaves a torn value behind.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl JsonFileStore {
    /// The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path backing `key`. Keys are restricted to `[A-Za-z0-9_.-]` and may not
    /// start with a dot.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(key, path, e)),
        };
        let value = serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        trace!(key, bytes = raw.len(), "store read");
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(key, &self.dir, e))?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{key}.{seq}.tmp"));
        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            return Err(StoreError::io(key, tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::io(key, path, e));
        }
        debug!(key, bytes = bytes.len(), "store write");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(key, path, e)),
        }
    }

    fn name(&self) -> &str {
        "json-file"
    }
}
