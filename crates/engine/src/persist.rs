// crates/engine/src/persist.rs
//! Best-effort durable writes. A failed write is logged and swallowed; it
//! never becomes a stream error.

use std::sync::Arc;

use genstream_store::KvStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{trace, warn};

#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn KvStore>,
}

impl Persister {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Returns `false` if the value could not be written.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "persist skipped: value not serializable");
                return false;
            }
        };
        match self.store.set(key, &value).await {
            Ok(()) => {
                trace!(key, backend = self.store.name(), "persisted");
                true
            }
            Err(e) => {
                warn!(key, backend = self.store.name(), error = %e, "persist failed");
                false
            }
        }
    }

    pub async fn remove(&self, key: &str) -> bool {
        match self.store.remove(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, backend = self.store.name(), error = %e, "persist remove failed");
                false
            }
        }
    }

    /// `None` when missing, unreadable, or of the wrong shape (the latter two
    /// are logged).
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.store.get(key).await {
            Ok(v) => v?,
            Err(e) => {
                warn!(key, backend = self.store.name(), error = %e, "load failed");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "stored value has unexpected shape; ignoring");
                None
            }
        }
    }
}
