// Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use genstream_engine::{ByteStream, Engine, EngineConfig, Transport, TransportError};
use genstream_store::{KvStore, MemoryStore, StoreError};
use serde_json::Value;
use tokio::sync::mpsc;

/// One scripted response.
pub enum Script {
    /// Whole body available immediately, as these chunks.
    Chunks(Vec<Vec<u8>>),
    /// Body fed by the test through a channel; closing the sender ends it.
    Live(mpsc::UnboundedReceiver<Vec<u8>>),
    /// Non-success HTTP status.
    Status(u16),
}

/// In-memory transport that replays scripts in order.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    pub opened: Mutex<Vec<(String, Value)>>,
    pub posts: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Queue a live body and return its sender.
    pub fn push_live(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Script::Live(rx));
        tx
    }

    pub fn last_request(&self) -> Option<Value> {
        self.opened.lock().unwrap().last().map(|(_, body)| body.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, url: &str, body: &Value) -> Result<ByteStream, TransportError> {
        self.opened
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Chunks(chunks)) => Ok(Box::pin(stream::iter(
                chunks.into_iter().map(|c| Ok(Bytes::from(c))),
            ))),
            Some(Script::Live(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (Ok(Bytes::from(chunk)), rx))
            }))),
            Some(Script::Status(status)) => Err(TransportError::Status {
                url: url.to_string(),
                status,
                body: "scripted failure".into(),
            }),
            None => Err(TransportError::request(url, "no script queued")),
        }
    }

    async fn post(&self, url: &str, body: &Value) -> Result<(), TransportError> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        Ok(())
    }
}

/// Memory store that counts writes per key.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    writes: Mutex<HashMap<String, usize>>,
}

impl CountingStore {
    pub fn writes(&self, key: &str) -> usize {
        self.writes.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl KvStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        *self.writes.lock().unwrap().entry(key.to_string()).or_default() += 1;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<CountingStore>,
}

pub async fn harness_with(config: EngineConfig) -> Harness {
    let transport = Arc::new(ScriptedTransport::default());
    let store = Arc::new(CountingStore::default());
    let engine = Arc::new(Engine::new(config, store.clone(), transport.clone()));
    engine.initialize().await;
    Harness {
        engine,
        transport,
        store,
    }
}

pub async fn harness() -> Harness {
    harness_with(EngineConfig::default()).await
}

/// Encode report events as `data:` blocks.
pub fn sse(events: &[Value]) -> Vec<u8> {
    events
        .iter()
        .map(|e| format!("data: {e}\n\n"))
        .collect::<String>()
        .into_bytes()
}

/// Encode chat events as JSON lines.
pub fn ndjson(events: &[Value]) -> Vec<u8> {
    events
        .iter()
        .map(|e| format!("{e}\n"))
        .collect::<String>()
        .into_bytes()
}

/// Split `bytes` into chunks of `size` (the last may be shorter).
pub fn chunked(bytes: &[u8], size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(size).map(<[u8]>::to_vec).collect()
}

/// Yield until `cond` holds (bounded, to fail fast instead of hanging).
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
