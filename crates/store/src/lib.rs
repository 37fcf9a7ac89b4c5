// crates/store/src/lib.rs
pub mod error;
pub mod file;
pub mod keys;
pub mod memory;
pub mod report_cache;

pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use report_cache::ReportCache;

use async_trait::async_trait;
use serde_json::Value;

/// Durable JSON store. Values are write-through mirrors of in-memory state,
/// never the source of truth while a stream is active.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// `Ok(None)` when the key has never been written or was removed.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
