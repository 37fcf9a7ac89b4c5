// crates/engine/src/manager.rs
//! Stream ownership: at most one active stream per kind.
//!
//! Single-flight is per kind, not global: a report stream and a chat stream
//! may run side by side, two chat streams may not. Each accepted stream gets
//! a fresh [`CancellationToken`] and an RAII [`StreamGuard`] that releases
//! the slot when the stream's task ends, however it ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Report,
    Chat,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Chat => "chat",
        }
    }
}

/// How a stream ended. Cancellation is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Public view of an active stream's ownership token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStream {
    pub stream_id: u64,
    /// Session id (chat) or report id (report).
    pub owner_id: String,
    /// Message id (chat) or report id (report).
    pub target_id: String,
}

struct Slot {
    info: ActiveStream,
    token: CancellationToken,
}

pub struct StreamManager {
    next_id: AtomicU64,
    // std Mutex: never held across an await.
    active: Mutex<HashMap<StreamKind, Slot>>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the slot for `kind`, or fail without side effects if it is taken.
    pub fn try_acquire(
        self: &Arc<Self>,
        kind: StreamKind,
        owner_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Result<StreamGuard, StreamError> {
        let mut active = self.lock();
        if active.contains_key(&kind) {
            debug!(kind = kind.as_str(), "stream start rejected: already active");
            return Err(StreamError::AlreadyActive { kind: kind.as_str() });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let info = ActiveStream {
            stream_id: id,
            owner_id: owner_id.into(),
            target_id: target_id.into(),
        };
        info!(
            kind = kind.as_str(),
            stream_id = id,
            owner_id = %info.owner_id,
            "stream acquired"
        );
        active.insert(
            kind,
            Slot {
                info,
                token: token.clone(),
            },
        );
        Ok(StreamGuard {
            manager: Arc::clone(self),
            kind,
            id,
            token,
        })
    }

    /// Cancel the active stream of `kind`. Returns `false` if none is active.
    pub fn cancel(&self, kind: StreamKind) -> bool {
        match self.lock().get(&kind) {
            Some(slot) => {
                info!(kind = kind.as_str(), stream_id = slot.info.stream_id, "stream cancel requested");
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, kind: StreamKind) -> bool {
        self.lock().contains_key(&kind)
    }

    pub fn active(&self, kind: StreamKind) -> Option<ActiveStream> {
        self.lock().get(&kind).map(|slot| slot.info.clone())
    }

    fn retarget(&self, kind: StreamKind, id: u64, owner_id: String, target_id: String) {
        if let Some(slot) = self.lock().get_mut(&kind) {
            if slot.info.stream_id == id {
                slot.info.owner_id = owner_id;
                slot.info.target_id = target_id;
            }
        }
    }

    fn release(&self, kind: StreamKind, id: u64) {
        let mut active = self.lock();
        if active.get(&kind).is_some_and(|slot| slot.info.stream_id == id) {
            active.remove(&kind);
            debug!(kind = kind.as_str(), stream_id = id, "stream released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StreamKind, Slot>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a kind's slot; dropping it releases the slot.
pub struct StreamGuard {
    manager: Arc<StreamManager>,
    kind: StreamKind,
    id: u64,
    token: CancellationToken,
}

impl StreamGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Record the owner/target once they are known.
    pub fn retarget(&self, owner_id: impl Into<String>, target_id: impl Into<String>) {
        self.manager
            .retarget(self.kind, self.id, owner_id.into(), target_id.into());
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.manager.release(self.kind, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight_per_kind() {
        let manager = Arc::new(StreamManager::new());
        let chat = manager.try_acquire(StreamKind::Chat, "s1", "m1").unwrap();
        let err = manager.try_acquire(StreamKind::Chat, "s2", "m2").err().unwrap();
        assert!(matches!(err, StreamError::AlreadyActive { kind: "chat" }));

        // Rejection did not replace the owner.
        let active = manager.active(StreamKind::Chat).unwrap();
        assert_eq!(active.owner_id, "s1");
        assert_eq!(active.stream_id, chat.id());

        // Other kind is independent.
        let _report = manager.try_acquire(StreamKind::Report, "r", "r").unwrap();
        assert!(manager.is_active(StreamKind::Report));
    }

    #[test]
    fn test_drop_releases_slot() {
        let manager = Arc::new(StreamManager::new());
        {
            let _guard = manager.try_acquire(StreamKind::Report, "r1", "r1").unwrap();
            assert!(manager.is_active(StreamKind::Report));
        }
        assert!(!manager.is_active(StreamKind::Report));
        assert!(manager.try_acquire(StreamKind::Report, "r2", "r2").is_ok());
    }

    #[test]
    fn test_cancel_fires_token() {
        let manager = Arc::new(StreamManager::new());
        let guard = manager.try_acquire(StreamKind::Chat, "s", "m").unwrap();
        assert!(!guard.token().is_cancelled());
        assert!(manager.cancel(StreamKind::Chat));
        assert!(guard.token().is_cancelled());
        assert!(!manager.cancel(StreamKind::Report));
    }

    #[test]
    fn test_fresh_token_per_stream() {
        let manager = Arc::new(StreamManager::new());
        let first = manager.try_acquire(StreamKind::Chat, "s", "m").unwrap();
        manager.cancel(StreamKind::Chat);
        drop(first);
        let second = manager.try_acquire(StreamKind::Chat, "s", "m").unwrap();
        assert!(!second.token().is_cancelled());
    }

    #[test]
    fn test_retarget_updates_owner() {
        let manager = Arc::new(StreamManager::new());
        let guard = manager.try_acquire(StreamKind::Chat, "", "").unwrap();
        guard.retarget("session_1", "msg_1");
        let active = manager.active(StreamKind::Chat).unwrap();
        assert_eq!(active.owner_id, "session_1");
        assert_eq!(active.target_id, "msg_1");
    }
}
