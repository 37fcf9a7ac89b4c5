// crates/engine/src/error.rs
use std::path::PathBuf;

use genstream_core::{ChatActionError, FrameError};
use thiserror::Error;

/// Failure opening or reading a stream from the remote service.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Request to {url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Failed reading response body: {0}")]
    Body(String),
}

impl TransportError {
    pub fn request(url: &str, err: impl std::fmt::Display) -> Self {
        Self::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Errors surfaced by the stream lifecycle.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("A {kind} stream is already active")]
    AlreadyActive { kind: &'static str },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] FrameError),

    #[error("Stream ended without completion")]
    Incomplete,

    #[error(transparent)]
    Action(#[from] ChatActionError),

    #[error("Engine is not initialized")]
    NotInitialized,
}

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
