// crates/engine/src/engine.rs
//! The explicitly constructed application context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use genstream_store::{JsonFileStore, KvStore};
use tracing::info;

use crate::chat::ChatService;
use crate::config::EngineConfig;
use crate::error::TransportError;
use crate::manager::StreamManager;
use crate::persist::Persister;
use crate::report::ReportService;
use crate::transport::{HttpTransport, Transport};

/// Owns the store, the stream manager and both services. Built once by the
/// top-level application and passed to whatever needs it.
pub struct Engine {
    config: Arc<EngineConfig>,
    store: Arc<dyn KvStore>,
    manager: Arc<StreamManager>,
    report: ReportService,
    chat: ChatService,
    initialized: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<dyn KvStore>, transport: Arc<dyn Transport>) -> Self {
        let config = Arc::new(config);
        let manager = Arc::new(StreamManager::new());
        let persister = Persister::new(Arc::clone(&store));
        let report = ReportService::new(
            Arc::clone(&config),
            Arc::clone(&manager),
            Arc::clone(&transport),
            persister.clone(),
        );
        let chat = ChatService::new(Arc::clone(&config), Arc::clone(&manager), transport, persister);
        Self {
            config,
            store,
            manager,
            report,
            chat,
            initialized: AtomicBool::new(false),
        }
    }

    /// File store under `config.data_dir`, HTTP transport.
    pub fn from_config(config: EngineConfig) -> Result<Self, TransportError> {
        let store: Arc<dyn KvStore> = Arc::new(JsonFileStore::new(config.data_dir.clone()));
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Ok(Self::new(config, store, transport))
    }

    /// Restore persisted state. Runs once; later calls return `false`.
    pub async fn initialize(&self) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.chat.initialize().await;
        let restored = self.report.restore().await;
        let cached = self.report.load_cache().await;
        info!(
            backend = self.store.name(),
            report_restored = restored,
            cached_reports = cached,
            "engine initialized"
        );
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<StreamManager> {
        &self.manager
    }

    pub fn report(&self) -> &ReportService {
        &self.report
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    /// Cancel every active stream.
    pub fn cancel_all(&self) {
        self.report.abort();
        self.chat.stop_streaming();
    }
}
