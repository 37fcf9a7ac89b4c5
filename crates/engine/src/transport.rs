// crates/engine/src/transport.rs
//! Request/response collaborator yielding a chunked byte stream.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;

/// Response body as it arrives, chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Opens streaming requests against the generation service.
///
/// Implementations include:
/// - `HttpTransport`: POSTs JSON over HTTP with reqwest
/// - scripted in-memory transports in tests
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` and return the response body stream. A non-success
    /// status is an error; the body is not retried.
    async fn open(&self, url: &str, body: &Value) -> Result<ByteStream, TransportError>;

    /// Fire-and-forget JSON POST (feedback).
    async fn post(&self, url: &str, body: &Value) -> Result<(), TransportError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("genstream/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::request("<client>", e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str, body: &Value) -> Result<ByteStream, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        debug!(url, status = status.as_u16(), "stream opened");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn post(&self, url: &str, body: &Value) -> Result<(), TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::request(url, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
