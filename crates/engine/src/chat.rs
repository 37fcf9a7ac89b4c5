// crates/engine/src/chat.rs
//! Chat service: session actions plus the chat stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use genstream_core::{
    parse_event, ChatAccumulator, ChatActionError, ChatEvent, ChatSession, ChatStatus, ChatStep,
    ChatStore, Feedback, Framing, HistoryEntry, StreamTarget,
};
use genstream_store::keys::{CHAT_CURRENT_SESSION, CHAT_SESSIONS};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::changes::ChangeNotifier;
use crate::config::EngineConfig;
use crate::error::StreamError;
use crate::manager::{StreamKind, StreamManager, StreamOutcome};
use crate::persist::Persister;
use crate::pump::{drive, Flow, StreamSink};
use crate::throttle::{earliest, BatchedFlush};
use crate::transport::Transport;

/// Person the conversation is about, forwarded to the chat service.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Subject {
    pub name: Option<String>,
    pub birth: Option<String>,
    pub gender: Option<String>,
    pub destiny: Option<Value>,
    pub chart: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub system_prompt: Option<String>,
    /// Falls back to `ChatDefaults::llm_provider`.
    pub llm_provider: Option<String>,
    pub deep_think: bool,
    pub subject: Option<Subject>,
}

struct ChatInner {
    store: RwLock<ChatStore>,
    changes: ChangeNotifier,
    manager: Arc<StreamManager>,
    transport: Arc<dyn Transport>,
    persister: Persister,
    config: Arc<EngineConfig>,
    initialized: AtomicBool,
}

impl ChatInner {
    fn read(&self) -> RwLockReadGuard<'_, ChatStore> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChatStore> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Write non-draft sessions, and the current id only if it names a
    /// non-draft, non-empty session.
    async fn save_sessions(&self) {
        let plan = self.read().persist_plan();
        self.persister.save(CHAT_SESSIONS, &plan.sessions).await;
        match plan.current_session_id {
            Some(id) => self.persister.save(CHAT_CURRENT_SESSION, &id).await,
            None => self.persister.remove(CHAT_CURRENT_SESSION).await,
        };
    }
}

/// Handle to the chat session collection. Cheap to clone.
#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ChatInner>,
}

impl ChatService {
    pub fn new(
        config: Arc<EngineConfig>,
        manager: Arc<StreamManager>,
        transport: Arc<dyn Transport>,
        persister: Persister,
    ) -> Self {
        let store = ChatStore::new(config.chat_defaults.clone());
        Self {
            inner: Arc::new(ChatInner {
                store: RwLock::new(store),
                changes: ChangeNotifier::new(),
                manager,
                transport,
                persister,
                config,
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Load persisted sessions once and write the cleaned-up state back.
    /// Returns `false` if already initialized.
    pub async fn initialize(&self) -> bool {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return false;
        }
        let sessions: Vec<ChatSession> = self
            .inner
            .persister
            .load(CHAT_SESSIONS)
            .await
            .unwrap_or_default();
        let current: Option<String> = self.inner.persister.load(CHAT_CURRENT_SESSION).await;
        let loaded = sessions.len();
        self.inner.write().initialize(sessions, current);
        self.inner.save_sessions().await;
        self.inner.changes.bump();
        info!(loaded, "chat sessions loaded");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    pub fn mutation_count(&self) -> u64 {
        self.inner.changes.current()
    }

    pub fn sessions(&self) -> Vec<ChatSession> {
        self.inner.read().sessions().to_vec()
    }

    /// Sessions shown in history (drafts excluded).
    pub fn history(&self) -> Vec<ChatSession> {
        self.inner.read().history().cloned().collect()
    }

    pub fn current(&self) -> Option<ChatSession> {
        self.inner.read().current().cloned()
    }

    pub fn status(&self) -> ChatStatus {
        self.inner.read().status().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.manager.is_active(StreamKind::Chat)
    }

    pub async fn create_session(&self, draft: bool, archive_id: Option<i64>) -> String {
        let id = self.inner.write().create_session(draft, archive_id).id.clone();
        if !draft {
            self.inner.save_sessions().await;
        }
        self.inner.changes.bump();
        id
    }

    pub async fn switch_session(&self, session_id: &str) -> Result<(), ChatActionError> {
        if self.is_streaming() {
            return Err(ChatActionError::Streaming);
        }
        self.inner.write().switch_session(session_id)?;
        self.inner.save_sessions().await;
        self.inner.changes.bump();
        Ok(())
    }

    /// Deleting the session a stream writes to is allowed; the stream's
    /// remaining events are dropped.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), ChatActionError> {
        self.inner.write().delete_session(session_id)?;
        self.inner.save_sessions().await;
        self.inner.changes.bump();
        Ok(())
    }

    pub async fn new_chat(&self) -> Result<String, ChatActionError> {
        if self.is_streaming() {
            return Err(ChatActionError::Streaming);
        }
        self.inner.save_sessions().await;
        let id = self.inner.write().new_chat()?.id.clone();
        self.inner.save_sessions().await;
        self.inner.changes.bump();
        Ok(id)
    }

    pub async fn set_archive_id(&self, archive_id: Option<i64>) {
        if self.inner.write().set_archive_id(archive_id) {
            self.inner.save_sessions().await;
            self.inner.changes.bump();
        }
    }

    /// Toggle feedback locally, then forward it best-effort.
    pub async fn send_feedback(
        &self,
        message_id: &str,
        feedback: Feedback,
    ) -> Result<Option<Feedback>, ChatActionError> {
        let (session_id, value) = self.inner.write().toggle_feedback(message_id, feedback)?;
        self.inner.save_sessions().await;
        self.inner.changes.bump();

        let body = json!({
            "session_id": session_id,
            "message_id": message_id,
            "feedback": value,
        });
        if let Err(e) = self
            .inner
            .transport
            .post(&self.inner.config.feedback_url, &body)
            .await
        {
            warn!(message_id, error = %e, "feedback delivery failed");
        }
        Ok(value)
    }

    /// Cancel the active chat stream.
    pub fn stop_streaming(&self) -> bool {
        self.inner.manager.cancel(StreamKind::Chat)
    }

    /// Send `text` in the current session and stream the reply into a new
    /// assistant message.
    ///
    /// Returns `Err` only when the message is not sent at all (engine not
    /// initialized, blank text, or a chat stream already running).
    pub async fn send_message(
        &self,
        text: &str,
        options: SendOptions,
    ) -> Result<StreamOutcome, StreamError> {
        if !self.is_initialized() {
            return Err(StreamError::NotInitialized);
        }
        if text.trim().is_empty() {
            return Err(ChatActionError::EmptyMessage.into());
        }
        let guard = self.inner.manager.try_acquire(StreamKind::Chat, "", "")?;
        let turn = self.inner.write().begin_turn(text)?;
        guard.retarget(
            turn.target.session_id.as_str(),
            turn.target.message_id.as_str(),
        );
        self.inner.save_sessions().await;
        self.inner.changes.bump();

        let request = build_request(&turn.history, &options, &self.inner.config.chat_defaults.llm_provider);
        info!(
            stream_id = guard.id(),
            session_id = %turn.target.session_id,
            message_id = %turn.target.message_id,
            history = turn.history.len(),
            "chat stream started"
        );

        let mut sink = ChatSink::new(Arc::clone(&self.inner), turn.target);
        let outcome = drive(
            self.inner.transport.as_ref(),
            &self.inner.config.chat_url,
            &request,
            Framing::Line,
            guard.token(),
            &mut sink,
        )
        .await;

        info!(
            stream_id = guard.id(),
            outcome = outcome.as_str(),
            dropped_events = sink.acc.dropped(),
            "chat stream finished"
        );
        Ok(outcome)
    }
}

fn build_request(history: &[HistoryEntry], options: &SendOptions, default_provider: &str) -> Value {
    let subject = options.subject.as_ref();
    json!({
        "history": history,
        "system_prompt": options.system_prompt,
        "llm_provider": options.llm_provider.as_deref().unwrap_or(default_provider),
        "subject_enabled": subject.is_some(),
        "subject_name": subject.and_then(|s| s.name.as_ref()),
        "subject_birth": subject.and_then(|s| s.birth.as_ref()),
        "subject_gender": subject.and_then(|s| s.gender.as_ref()),
        "subject_destiny": subject.and_then(|s| s.destiny.as_ref()),
        "subject_chart": subject.and_then(|s| s.chart.as_ref()),
        "deep_think": options.deep_think,
    })
}

struct ChatSink {
    inner: Arc<ChatInner>,
    acc: ChatAccumulator,
    frame: BatchedFlush,
    persist: BatchedFlush,
}

impl ChatSink {
    fn new(inner: Arc<ChatInner>, target: StreamTarget) -> Self {
        Self {
            frame: BatchedFlush::new(inner.config.frame_interval()),
            persist: BatchedFlush::new(inner.config.persist_delay()),
            acc: ChatAccumulator::new(target),
            inner,
        }
    }
}

#[async_trait]
impl StreamSink for ChatSink {
    fn on_frame(&mut self, frame: &str) -> Flow {
        let event: ChatEvent = match parse_event(frame) {
            Ok(event) => event,
            Err(e) => {
                let message = self.on_failure(&StreamError::Decode(e));
                return Flow::Stop(StreamOutcome::Failed(message));
            }
        };

        let step = {
            let mut store = self.inner.write();
            self.acc.apply(&mut store, &event)
        };
        match step {
            ChatStep::Buffered => {
                self.frame.trigger();
                Flow::Continue
            }
            ChatStep::Ignored => {
                debug!(frame_len = frame.len(), "chat side-channel event ignored");
                Flow::Continue
            }
            ChatStep::Completed => Flow::Stop(StreamOutcome::Completed),
            ChatStep::Failed(message) => Flow::Stop(StreamOutcome::Failed(message)),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest([self.frame.deadline(), self.persist.deadline()])
    }

    async fn on_deadline(&mut self) {
        if self.frame.take_due() {
            let flushed = {
                let mut store = self.inner.write();
                self.acc.flush(&mut store)
            };
            if flushed {
                self.persist.trigger();
            }
            self.inner.changes.bump();
        }
        if self.persist.take_due() {
            self.inner.save_sessions().await;
        }
    }

    fn on_failure(&mut self, error: &StreamError) -> String {
        let message = error.to_string();
        {
            let mut store = self.inner.write();
            match error {
                StreamError::Incomplete => self.acc.mark_incomplete(&mut store, &message),
                _ => self.acc.fail(&mut store, &message),
            }
        }
        self.inner.changes.bump();
        message
    }

    async fn finish(&mut self, _outcome: &StreamOutcome) {
        {
            let mut store = self.inner.write();
            self.acc.finish(&mut store);
        }
        self.frame.take();
        self.persist.take();
        self.inner.save_sessions().await;
        self.inner.changes.bump();
    }
}
