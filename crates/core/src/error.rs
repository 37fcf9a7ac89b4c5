// crates/core/src/error.rs
use thiserror::Error;

/// Longest slice of an offending frame kept inside a [`FrameError`].
const FRAME_EXCERPT_CHARS: usize = 120;

/// A single decoded frame could not be turned into a wire event.
///
/// Decode failures are reported per frame; the decoder itself keeps going and
/// the caller decides whether one bad frame ends the stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed frame payload ({message}): {excerpt}")]
    MalformedPayload { excerpt: String, message: String },

    #[error("Unexpected event shape ({message}): {excerpt}")]
    UnexpectedShape { excerpt: String, message: String },
}

impl FrameError {
    /// Classify a serde_json failure for `frame`.
    ///
    /// Syntax/EOF errors mean the payload is not JSON at all; data errors mean
    /// it parsed but did not match any known event variant.
    pub fn from_json(frame: &str, err: &serde_json::Error) -> Self {
        let excerpt = excerpt(frame);
        let message = err.to_string();
        if err.is_data() {
            Self::UnexpectedShape { excerpt, message }
        } else {
            Self::MalformedPayload { excerpt, message }
        }
    }
}

/// A chat user action was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatActionError {
    #[error("A reply is still being generated; try again once it finishes")]
    Streaming,

    #[error("Session not found: {0}")]
    UnknownSession(String),

    #[error("Message not found: {0}")]
    UnknownMessage(String),

    #[error("The current conversation is already empty")]
    AlreadyNewChat,

    #[error("Message is empty")]
    EmptyMessage,
}

fn excerpt(frame: &str) -> String {
    let mut chars = frame.chars();
    let head: String = chars.by_ref().take(FRAME_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
