// crates/store/src/report_cache.rs
//! Bounded most-recently-used cache of finished reports, keyed by report id.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::keys::REPORT_CACHE;
use crate::{KvStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedReport {
    pub report_id: String,
    pub report: Value,
}

/// MRU list written through to the store under a single key. The front is
/// the most recently used entry; inserting past capacity evicts from the back.
pub struct ReportCache {
    store: Arc<dyn KvStore>,
    capacity: usize,
    // std Mutex: never held across an await.
    entries: Mutex<VecDeque<CachedReport>>,
}

impl ReportCache {
    pub fn new(store: Arc<dyn KvStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids from most to least recently used.
    pub fn ids(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.report_id.clone()).collect()
    }

    /// Replace the in-memory list with the persisted one. An unreadable entry
    /// is logged and treated as an empty cache.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let loaded = match self.store.get(REPORT_CACHE).await? {
            Some(value) => match serde_json::from_value::<Vec<CachedReport>>(value) {
                Ok(list) => list,
                Err(e) => {
                    warn!(error = %e, "report cache unreadable; starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let mut entries = self.lock();
        *entries = loaded.into_iter().take(self.capacity).collect();
        debug!(entries = entries.len(), "report cache loaded");
        Ok(entries.len())
    }

    /// Look up a report and mark it most recently used.
    pub async fn get(&self, report_id: &str) -> Result<Option<Value>, StoreError> {
        let (report, moved) = {
            let mut entries = self.lock();
            let Some(pos) = entries.iter().position(|e| e.report_id == report_id) else {
                return Ok(None);
            };
            let Some(hit) = entries.remove(pos) else {
                return Ok(None);
            };
            let report = hit.report.clone();
            entries.push_front(hit);
            let moved = (pos != 0).then(|| Self::snapshot(&entries));
            (report, moved)
        };
        // Already at the front: recency unchanged, nothing to write.
        if let Some(snapshot) = moved {
            self.write(snapshot).await?;
        }
        Ok(Some(report))
    }

    /// Insert or refresh a report at the front, evicting the least recently
    /// used entries beyond capacity.
    pub async fn put(&self, report_id: &str, report: Value) -> Result<(), StoreError> {
        let snapshot = {
            let mut entries = self.lock();
            entries.retain(|e| e.report_id != report_id);
            entries.push_front(CachedReport {
                report_id: report_id.to_string(),
                report,
            });
            while entries.len() > self.capacity {
                if let Some(evicted) = entries.pop_back() {
                    debug!(report_id = %evicted.report_id, "report cache eviction");
                }
            }
            Self::snapshot(&entries)
        };
        self.write(snapshot).await
    }

    async fn write(&self, snapshot: Vec<CachedReport>) -> Result<(), StoreError> {
        let value = serde_json::to_value(&snapshot).map_err(|source| StoreError::Serialize {
            key: REPORT_CACHE.to_string(),
            source,
        })?;
        self.store.set(REPORT_CACHE, &value).await
    }

    fn snapshot(entries: &VecDeque<CachedReport>) -> Vec<CachedReport> {
        entries.iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<CachedReport>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn cache(capacity: usize) -> (Arc<MemoryStore>, ReportCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ReportCache::new(store.clone(), capacity);
        (store, cache)
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let (_, cache) = cache(2);
        cache.put("a", json!(1)).await.unwrap();
        cache.put("b", json!(2)).await.unwrap();
        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(cache.get("a").await.unwrap(), Some(json!(1)));
        cache.put("c", json!(3)).await.unwrap();
        assert_eq!(cache.ids(), vec!["c", "a"]);
        assert_eq!(cache.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_existing_refreshes_without_duplicate() {
        let (_, cache) = cache(3);
        cache.put("a", json!(1)).await.unwrap();
        cache.put("b", json!(2)).await.unwrap();
        cache.put("a", json!(10)).await.unwrap();
        assert_eq!(cache.ids(), vec!["a", "b"]);
        assert_eq!(cache.get("a").await.unwrap(), Some(json!(10)));
    }

    #[tokio::test]
    async fn test_written_through_and_reloaded() {
        let (store, cache) = cache(5);
        cache.put("a", json!({"x": 1})).await.unwrap();
        cache.put("b", json!({"x": 2})).await.unwrap();
        cache.get("a").await.unwrap();

        let reloaded = ReportCache::new(store, 5);
        assert_eq!(reloaded.load().await.unwrap(), 2);
        assert_eq!(reloaded.ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_load_truncates_to_capacity() {
        let (store, cache) = cache(5);
        for id in ["a", "b", "c", "d"] {
            cache.put(id, json!(id)).await.unwrap();
        }
        let smaller = ReportCache::new(store, 2);
        smaller.load().await.unwrap();
        assert_eq!(smaller.ids(), vec!["d", "c"]);
    }

    #[tokio::test]
    async fn test_persisted_entries_use_camel_case_keys() {
        let (store, cache) = cache(2);
        cache.put("r1", json!({"x": 1})).await.unwrap();
        let stored = store.get(REPORT_CACHE).await.unwrap().unwrap();
        assert_eq!(stored, json!([{"reportId": "r1", "report": {"x": 1}}]));
        let entries: Vec<CachedReport> = serde_json::from_value(stored).unwrap();
        assert_eq!(entries[0].report_id, "r1");
    }

    #[tokio::test]
    async fn test_unreadable_cache_starts_empty() {
        let (store, cache) = cache(2);
        store.set(REPORT_CACHE, &json!("garbage")).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), 0);
        assert!(cache.is_empty());
    }
}
