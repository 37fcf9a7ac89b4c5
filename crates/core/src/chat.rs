// crates/core/src/chat.rs
//! Chat sessions and the chat stream reducer.
//!
//! [`ChatStore`] owns the session collection and applies user actions.
//! [`ChatAccumulator`] applies one stream's [`ChatEvent`]s to a single
//! assistant message, re-checking that the message's session is still the
//! current one before every write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::defaults::ChatDefaults;
use crate::error::ChatActionError;
use crate::events::ChatEvent;

const TITLE_CHARS: usize = 30;
const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id("msg"),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            feedback: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub archive_id: Option<i64>,
    /// Drafts with no messages are never persisted or listed.
    #[serde(default)]
    pub is_draft: bool,
}

impl ChatSession {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Title from the first user message, preview from the last message.
    fn refresh_summary(&mut self) {
        if let Some(first_user) = self.messages.iter().find(|m| m.role == Role::User) {
            self.title = truncate_with_ellipsis(&first_user.content, TITLE_CHARS);
        }
        if let Some(last) = self.messages.last() {
            self.preview = truncate_with_ellipsis(&last.content, PREVIEW_CHARS);
        }
    }
}

/// Transient flags of the chat stream; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatus {
    /// Sent, but no visible reply text yet.
    pub thinking: bool,
    pub streaming: bool,
    pub last_error: Option<String>,
}

impl ChatStatus {
    pub fn is_busy(&self) -> bool {
        self.thinking || self.streaming
    }
}

/// One prior message as sent back to the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// The `(session, message)` pair a chat stream is allowed to write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub session_id: String,
    pub message_id: String,
}

/// Everything needed to open the stream for a freshly sent message.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub target: StreamTarget,
    /// All messages before the empty assistant placeholder.
    pub history: Vec<HistoryEntry>,
}

/// What should be written to durable storage after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistPlan {
    pub sessions: Vec<ChatSession>,
    /// `None` means the current-session key should be removed.
    pub current_session_id: Option<String>,
}

/// The chat session collection. Newest sessions first.
#[derive(Debug, Clone)]
pub struct ChatStore {
    sessions: Vec<ChatSession>,
    current_session_id: Option<String>,
    status: ChatStatus,
    defaults: ChatDefaults,
    initialized: bool,
}

impl ChatStore {
    pub fn new(defaults: ChatDefaults) -> Self {
        Self {
            sessions: Vec::new(),
            current_session_id: None,
            status: ChatStatus::default(),
            defaults,
            initialized: false,
        }
    }

    /// Load persisted state once. Empty sessions are dropped; the saved
    /// current id is kept only if that session survived, falling back to the
    /// first session and then to a new draft.
    ///
    /// Returns `false` (and changes nothing) if already initialized.
    pub fn initialize(&mut self, loaded: Vec<ChatSession>, saved_current: Option<String>) -> bool {
        if self.initialized {
            return false;
        }
        self.sessions = loaded
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|mut s| {
                s.is_draft = false;
                s
            })
            .collect();

        self.current_session_id = match saved_current {
            Some(id) if self.sessions.iter().any(|s| s.id == id) => Some(id),
            _ => self.sessions.first().map(|s| s.id.clone()),
        };
        if self.current_session_id.is_none() {
            self.create_session(true, None);
        }
        self.initialized = true;
        debug!(sessions = self.sessions.len(), "chat store initialized");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Sessions shown in history: everything that is not a draft.
    pub fn history(&self) -> impl Iterator<Item = &ChatSession> {
        self.sessions.iter().filter(|s| !s.is_draft)
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    pub fn current(&self) -> Option<&ChatSession> {
        let id = self.current_session_id.as_deref()?;
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn status(&self) -> &ChatStatus {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut ChatStatus {
        &mut self.status
    }

    pub fn defaults(&self) -> &ChatDefaults {
        &self.defaults
    }

    /// Insert a session at the front and make it current. An empty draft that
    /// was current is discarded first.
    pub fn create_session(&mut self, draft: bool, archive_id: Option<i64>) -> &ChatSession {
        self.cleanup_empty_draft();
        let now = Utc::now();
        let session = ChatSession {
            id: new_id("session"),
            title: String::new(),
            preview: self.defaults.new_session_preview.clone(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            archive_id,
            is_draft: draft,
        };
        self.current_session_id = Some(session.id.clone());
        self.sessions.insert(0, session);
        &self.sessions[0]
    }

    /// Remove the current session if it is an empty draft.
    pub fn cleanup_empty_draft(&mut self) {
        let Some(id) = self.current_session_id.clone() else {
            return;
        };
        self.sessions.retain(|s| !(s.id == id && s.is_draft && s.is_empty()));
    }

    pub fn switch_session(&mut self, session_id: &str) -> Result<(), ChatActionError> {
        if self.status.is_busy() {
            return Err(ChatActionError::Streaming);
        }
        if !self.sessions.iter().any(|s| s.id == session_id) {
            return Err(ChatActionError::UnknownSession(session_id.to_string()));
        }
        self.cleanup_empty_draft();
        self.current_session_id = Some(session_id.to_string());
        Ok(())
    }

    /// Delete a session. Deleting the current one moves to the first remaining
    /// session, or to a fresh draft when none remain.
    pub fn delete_session(&mut self, session_id: &str) -> Result<(), ChatActionError> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.id == session_id)
            .ok_or_else(|| ChatActionError::UnknownSession(session_id.to_string()))?;
        self.sessions.remove(index);

        if self.current_session_id.as_deref() == Some(session_id) {
            match self.sessions.first() {
                Some(first) => self.current_session_id = Some(first.id.clone()),
                None => {
                    self.create_session(true, None);
                }
            }
        }
        Ok(())
    }

    /// Start a new empty conversation. Refused while a reply is in flight or
    /// when the current conversation has no messages yet.
    pub fn new_chat(&mut self) -> Result<&ChatSession, ChatActionError> {
        if self.status.is_busy() {
            return Err(ChatActionError::Streaming);
        }
        if self.current().map_or(true, ChatSession::is_empty) {
            return Err(ChatActionError::AlreadyNewChat);
        }
        Ok(self.create_session(true, None))
    }

    /// Returns `true` if the archive id changed.
    pub fn set_archive_id(&mut self, archive_id: Option<i64>) -> bool {
        let Some(session) = self.current_mut() else {
            return false;
        };
        if session.archive_id == archive_id {
            return false;
        }
        session.archive_id = archive_id;
        session.updated_at = Utc::now();
        true
    }

    /// Toggle feedback on a message of the current session; giving the same
    /// feedback twice clears it. Returns the session id and the new value.
    pub fn toggle_feedback(
        &mut self,
        message_id: &str,
        feedback: Feedback,
    ) -> Result<(String, Option<Feedback>), ChatActionError> {
        let session = self
            .current_mut()
            .ok_or_else(|| ChatActionError::UnknownMessage(message_id.to_string()))?;
        let message = session
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| ChatActionError::UnknownMessage(message_id.to_string()))?;
        message.feedback = match message.feedback {
            Some(existing) if existing == feedback => None,
            _ => Some(feedback),
        };
        Ok((session.id.clone(), message.feedback))
    }

    /// Append a user message and an empty assistant placeholder to the current
    /// session (creating a draft if there is none) and mark the store busy.
    pub fn begin_turn(&mut self, text: &str) -> Result<ChatTurn, ChatActionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatActionError::EmptyMessage);
        }
        if self.current().is_none() {
            self.create_session(true, None);
        }
        let session = self
            .current_mut()
            .ok_or_else(|| ChatActionError::UnknownSession(String::new()))?;

        session.messages.push(Message::new(Role::User, text));
        let history = session
            .messages
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        let placeholder = Message::new(Role::Assistant, "");
        let message_id = placeholder.id.clone();
        session.messages.push(placeholder);
        session.is_draft = false;
        session.updated_at = Utc::now();
        session.refresh_summary();
        let session_id = session.id.clone();

        self.status = ChatStatus {
            thinking: true,
            streaming: true,
            last_error: None,
        };
        Ok(ChatTurn {
            target: StreamTarget {
                session_id,
                message_id,
            },
            history,
        })
    }

    /// The message a stream may write to, or `None` if its session is no
    /// longer current or the message has gone.
    pub fn target_message_mut(&mut self, target: &StreamTarget) -> Option<&mut Message> {
        if self.current_session_id.as_deref() != Some(target.session_id.as_str()) {
            return None;
        }
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == target.session_id)?;
        session.updated_at = Utc::now();
        session
            .messages
            .iter_mut()
            .find(|m| m.id == target.message_id)
    }

    fn refresh_summary(&mut self, session_id: &str) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) {
            session.refresh_summary();
        }
    }

    /// Non-draft sessions, plus the current id if it names a non-draft,
    /// non-empty session.
    pub fn persist_plan(&self) -> PersistPlan {
        PersistPlan {
            sessions: self.history().cloned().collect(),
            current_session_id: self
                .current()
                .filter(|s| !s.is_draft && !s.is_empty())
                .map(|s| s.id.clone()),
        }
    }

    fn current_mut(&mut self) -> Option<&mut ChatSession> {
        let id = self.current_session_id.clone()?;
        self.sessions.iter_mut().find(|s| s.id == id)
    }
}

/// Outcome of applying one chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStep {
    /// Delta buffered; call [`ChatAccumulator::flush`] to make it visible.
    Buffered,
    Ignored,
    Completed,
    Failed(String),
}

/// Reducer for one in-flight assistant message.
///
/// Deltas are buffered until [`flush`](Self::flush); terminal events flush
/// first so no buffered text is lost before the final write.
#[derive(Debug)]
pub struct ChatAccumulator {
    target: StreamTarget,
    pending: String,
    saw_text: bool,
    dropped: usize,
}

impl ChatAccumulator {
    pub fn new(target: StreamTarget) -> Self {
        Self {
            target,
            pending: String::new(),
            saw_text: false,
            dropped: 0,
        }
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Events that could not be applied because the target vanished.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn apply(&mut self, store: &mut ChatStore, event: &ChatEvent) -> ChatStep {
        match event {
            ChatEvent::Delta { text } => {
                self.pending.push_str(text);
                if !self.saw_text && !self.pending.is_empty() {
                    self.saw_text = true;
                    store.status_mut().thinking = false;
                }
                ChatStep::Buffered
            }
            ChatEvent::Done { reply, .. } => {
                self.flush(store);
                match store.target_message_mut(&self.target) {
                    Some(message) => message.content = reply.clone(),
                    None => self.note_dropped("done"),
                }
                store.refresh_summary(&self.target.session_id);
                ChatStep::Completed
            }
            ChatEvent::Error { message } => {
                let message = if message.is_empty() {
                    store.defaults().error_message.clone()
                } else {
                    message.clone()
                };
                self.fail(store, &message);
                ChatStep::Failed(message)
            }
            ChatEvent::Thinking { .. } => ChatStep::Ignored,
        }
    }

    /// Move buffered delta text into the target message. Returns `true` if
    /// anything was written.
    pub fn flush(&mut self, store: &mut ChatStore) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let pending = std::mem::take(&mut self.pending);
        match store.target_message_mut(&self.target) {
            Some(message) => {
                message.content.push_str(&pending);
                true
            }
            None => {
                self.note_dropped("delta");
                false
            }
        }
    }

    /// Terminal failure: flush, then replace the reply with an error annotation.
    pub fn fail(&mut self, store: &mut ChatStore, message: &str) {
        self.flush(store);
        let annotated = format!("{}{}", store.defaults().error_prefix, message);
        match store.target_message_mut(&self.target) {
            Some(target) => target.content = annotated,
            None => self.note_dropped("error"),
        }
        store.refresh_summary(&self.target.session_id);
        store.status_mut().last_error = Some(message.to_string());
    }

    /// The stream ended without `done`: keep whatever text arrived and record
    /// the error without touching the message.
    pub fn mark_incomplete(&mut self, store: &mut ChatStore, message: &str) {
        self.flush(store);
        store.refresh_summary(&self.target.session_id);
        store.status_mut().last_error = Some(message.to_string());
    }

    /// Final flush and clear the busy flags. Runs for every outcome,
    /// including cancellation.
    pub fn finish(&mut self, store: &mut ChatStore) {
        self.flush(store);
        let status = store.status_mut();
        status.thinking = false;
        status.streaming = false;
    }

    fn note_dropped(&mut self, kind: &'static str) {
        self.dropped += 1;
        warn!(
            session_id = %self.target.session_id,
            message_id = %self.target.message_id,
            kind,
            "chat stream target no longer current; event dropped"
        );
    }
}

/// First `max` characters, with `...` appended when anything was cut.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn new_id(prefix: &str) -> String {
    let rand = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", Utc::now().timestamp_millis(), &rand[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> ChatStore {
        let mut store = ChatStore::new(ChatDefaults::default());
        store.initialize(Vec::new(), None);
        store
    }

    fn delta(text: &str) -> ChatEvent {
        ChatEvent::Delta { text: text.into() }
    }

    fn content(store: &ChatStore, target: &StreamTarget) -> String {
        store
            .session(&target.session_id)
            .and_then(|s| s.messages.iter().find(|m| m.id == target.message_id))
            .map(|m| m.content.clone())
            .unwrap()
    }

    #[test]
    fn test_initialize_creates_draft_when_empty() {
        let store = store();
        assert_eq!(store.sessions().len(), 1);
        assert!(store.current().unwrap().is_draft);
        assert_eq!(store.history().count(), 0);
        assert_eq!(store.current().unwrap().preview, "新对话");
    }

    #[test]
    fn test_initialize_only_once() {
        let mut store = store();
        assert!(!store.initialize(Vec::new(), None));
        assert_eq!(store.sessions().len(), 1);
    }

    #[test]
    fn test_initialize_drops_empty_and_restores_current() {
        let mut source = store();
        source.begin_turn("first").unwrap();
        let kept = source.current().unwrap().clone();
        let mut empty = kept.clone();
        empty.id = "empty".into();
        empty.messages.clear();

        let mut restored = ChatStore::new(ChatDefaults::default());
        restored.initialize(vec![empty, kept.clone()], Some("empty".into()));
        assert_eq!(restored.sessions().len(), 1);
        // Saved id pointed at a dropped session: fall back to the first.
        assert_eq!(restored.current_session_id(), Some(kept.id.as_str()));
    }

    #[test]
    fn test_hi_there_incomplete_keeps_content() {
        let mut store = store();
        let turn = store.begin_turn("hello").unwrap();
        let mut acc = ChatAccumulator::new(turn.target.clone());

        assert_eq!(acc.apply(&mut store, &delta("Hi")), ChatStep::Buffered);
        assert!(!store.status().thinking);
        acc.apply(&mut store, &delta(" there"));
        acc.mark_incomplete(&mut store, "stream ended without completion");
        acc.finish(&mut store);

        assert_eq!(content(&store, &turn.target), "Hi there");
        assert_eq!(
            store.status().last_error.as_deref(),
            Some("stream ended without completion")
        );
        assert!(!store.status().streaming);
    }

    #[test]
    fn test_done_overwrites_accumulated_deltas() {
        let mut store = store();
        let turn = store.begin_turn("hello").unwrap();
        let mut acc = ChatAccumulator::new(turn.target.clone());
        acc.apply(&mut store, &delta("Hi th"));
        acc.flush(&mut store);
        acc.apply(&mut store, &delta("ere!!"));
        let step = acc.apply(
            &mut store,
            &ChatEvent::Done {
                reply: "Hi there!".into(),
                thinking: None,
            },
        );
        assert_eq!(step, ChatStep::Completed);
        assert!(!acc.has_pending());
        assert_eq!(content(&store, &turn.target), "Hi there!");
        assert_eq!(store.current().unwrap().preview, "Hi there!");
    }

    #[test]
    fn test_error_event_annotates_reply() {
        let mut store = store();
        let turn = store.begin_turn("hello").unwrap();
        let mut acc = ChatAccumulator::new(turn.target.clone());
        acc.apply(&mut store, &delta("partial"));
        let step = acc.apply(&mut store, &ChatEvent::Error { message: String::new() });
        assert_eq!(step, ChatStep::Failed("对话失败".into()));
        assert_eq!(content(&store, &turn.target), "出错了：对话失败");
        assert_eq!(store.status().last_error.as_deref(), Some("对话失败"));
    }

    #[test]
    fn test_thinking_event_ignored() {
        let mut store = store();
        let turn = store.begin_turn("hello").unwrap();
        let mut acc = ChatAccumulator::new(turn.target.clone());
        let step = acc.apply(&mut store, &ChatEvent::Thinking { text: "hmm".into() });
        assert_eq!(step, ChatStep::Ignored);
        assert!(store.status().thinking);
        assert_eq!(content(&store, &turn.target), "");
    }

    #[test]
    fn test_events_dropped_after_target_deleted() {
        let mut store = store();
        let turn = store.begin_turn("hello").unwrap();
        let mut acc = ChatAccumulator::new(turn.target.clone());
        store.delete_session(&turn.target.session_id).unwrap();

        acc.apply(&mut store, &delta("lost"));
        assert!(!acc.flush(&mut store));
        acc.apply(
            &mut store,
            &ChatEvent::Done {
                reply: "lost".into(),
                thinking: None,
            },
        );
        assert_eq!(acc.dropped(), 2);
        // The replacement draft was untouched.
        assert!(store.current().unwrap().is_empty());
    }

    #[test]
    fn test_events_dropped_when_session_no_longer_current() {
        let mut store = store();
        let other = store.begin_turn("old conversation").unwrap().target.session_id;
        store.status_mut().thinking = false;
        store.status_mut().streaming = false;
        store.new_chat().unwrap();
        let turn = store.begin_turn("new conversation").unwrap();
        let mut acc = ChatAccumulator::new(turn.target.clone());

        // Force the current pointer away without going through the busy check.
        store.current_session_id = Some(other);
        acc.apply(&mut store, &delta("stray"));
        assert!(!acc.flush(&mut store));
        assert_eq!(content(&store, &turn.target), "");
    }

    #[test]
    fn test_begin_turn_promotes_draft_and_builds_history() {
        let mut store = store();
        let turn = store.begin_turn("  你好  ").unwrap();
        let session = store.current().unwrap();
        assert!(!session.is_draft);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.title, "你好");
        assert_eq!(session.preview, "");
        assert_eq!(turn.history.len(), 1);
        assert_eq!(turn.history[0].content, "你好");
        assert_eq!(turn.history[0].role, Role::User);
        assert!(store.status().thinking && store.status().streaming);
    }

    #[test]
    fn test_begin_turn_rejects_blank_text() {
        let mut store = store();
        assert_eq!(store.begin_turn("   ").unwrap_err(), ChatActionError::EmptyMessage);
    }

    #[test]
    fn test_title_truncates_on_chars() {
        let mut store = store();
        let long = "八".repeat(40);
        store.begin_turn(&long).unwrap();
        let title = &store.current().unwrap().title;
        assert_eq!(title.chars().count(), TITLE_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_switch_and_new_chat_refused_while_streaming() {
        let mut store = store();
        store.begin_turn("hello").unwrap();
        assert_eq!(store.new_chat().unwrap_err(), ChatActionError::Streaming);
        let id = store.current_session_id().unwrap().to_string();
        assert_eq!(store.switch_session(&id).unwrap_err(), ChatActionError::Streaming);
    }

    #[test]
    fn test_new_chat_refused_when_current_is_empty() {
        let mut store = store();
        assert_eq!(store.new_chat().unwrap_err(), ChatActionError::AlreadyNewChat);
    }

    #[test]
    fn test_switch_session_discards_empty_draft() {
        let mut store = store();
        store.begin_turn("hello").unwrap();
        *store.status_mut() = ChatStatus::default();
        let first = store.current_session_id().unwrap().to_string();
        store.new_chat().unwrap();
        assert_eq!(store.sessions().len(), 2);

        store.switch_session(&first).unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current_session_id(), Some(first.as_str()));
        assert_eq!(
            store.switch_session("nope").unwrap_err(),
            ChatActionError::UnknownSession("nope".into())
        );
    }

    #[test]
    fn test_create_session_replaces_empty_draft() {
        let mut store = store();
        let draft = store.current_session_id().unwrap().to_string();
        store.create_session(true, None);
        store.create_session(true, Some(7));
        assert_eq!(store.sessions().len(), 1);
        assert!(store.session(&draft).is_none());
        assert_eq!(store.current().unwrap().archive_id, Some(7));

        // A draft with messages is kept.
        store.begin_turn("hello").unwrap();
        *store.status_mut() = ChatStatus::default();
        store.create_session(false, None);
        assert_eq!(store.sessions().len(), 2);
    }

    #[test]
    fn test_delete_current_falls_back() {
        let mut store = store();
        let only = store.current_session_id().unwrap().to_string();
        store.delete_session(&only).unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert_ne!(store.current_session_id(), Some(only.as_str()));
        assert!(store.current().unwrap().is_draft);
    }

    #[test]
    fn test_feedback_toggles() {
        let mut store = store();
        let turn = store.begin_turn("hello").unwrap();
        let id = &turn.target.message_id;
        let (_, fb) = store.toggle_feedback(id, Feedback::Like).unwrap();
        assert_eq!(fb, Some(Feedback::Like));
        let (_, fb) = store.toggle_feedback(id, Feedback::Dislike).unwrap();
        assert_eq!(fb, Some(Feedback::Dislike));
        let (_, fb) = store.toggle_feedback(id, Feedback::Dislike).unwrap();
        assert_eq!(fb, None);
        assert!(store.toggle_feedback("missing", Feedback::Like).is_err());
    }

    #[test]
    fn test_persist_plan_excludes_empty_drafts() {
        let mut store = store();
        let plan = store.persist_plan();
        assert!(plan.sessions.is_empty());
        assert_eq!(plan.current_session_id, None);

        store.begin_turn("hello").unwrap();
        let plan = store.persist_plan();
        assert_eq!(plan.sessions.len(), 1);
        assert_eq!(plan.current_session_id.as_deref(), store.current_session_id());
    }

    #[test]
    fn test_set_archive_id_reports_change() {
        let mut store = store();
        assert!(store.set_archive_id(Some(7)));
        assert!(!store.set_archive_id(Some(7)));
        assert_eq!(store.current().unwrap().archive_id, Some(7));
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let mut store = store();
        store.begin_turn("hello").unwrap();
        let json = serde_json::to_value(store.current().unwrap()).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("isDraft").is_some());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
