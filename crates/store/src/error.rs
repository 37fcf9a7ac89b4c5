// crates/store/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors from a durable store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error for key {key} at {path}: {source}")]
    Io {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored value for key {key} is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize value for key {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
}

impl StoreError {
    pub fn io(key: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.to_string(),
            path: path.into(),
            source,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Io { key, .. } | Self::Corrupt { key, .. } | Self::Serialize { key, .. } => key,
            Self::InvalidKey(key) => key,
        }
    }
}
