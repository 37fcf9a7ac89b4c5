// crates/engine/src/report.rs
//! Report stream service: owns the report aggregate and runs report streams.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use genstream_core::{
    parse_event, Framing, ReportAccumulator, ReportEvent, ReportStep, ReportStream,
};
use genstream_store::keys::{CURRENT_ANALYSIS, CURRENT_REPORT, CURRENT_REPORT_STREAM};
use genstream_store::ReportCache;
use serde_json::Value;
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

struct ReportInner {
    // std RwLock: reducer steps are synchronous, never held across an await.
    state: RwLock<ReportAccumulator>,
    changes: ChangeNotifier,
    manager: Arc<StreamManager>,
    transport: Arc<dyn Transport>,
    persister: Persister,
    cache: ReportCache,
    config: Arc<EngineConfig>,
}

impl ReportInner {
    fn read(&self) -> RwLockReadGuard<'_, ReportAccumulator> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReportAccumulator> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    async fn persist_snapshot(&self) {
        let snapshot = self.read().snapshot();
        self.persister.save(CURRENT_REPORT_STREAM, &snapshot).await;
    }
}

/// Handle to the report aggregate. Cheap to clone.
#[derive(Clone)]
pub struct ReportService {
    inner: Arc<ReportInner>,
}

impl ReportService {
    pub fn new(
        config: Arc<EngineConfig>,
        manager: Arc<StreamManager>,
        transport: Arc<dyn Transport>,
        persister: Persister,
    ) -> Self {
        let cache = ReportCache::new(persister.store().clone(), config.report_cache_capacity);
        let state = ReportAccumulator::new(config.report_defaults.clone());
        Self {
            inner: Arc::new(ReportInner {
                state: RwLock::new(state),
                changes: ChangeNotifier::new(),
                manager,
                transport,
                persister,
                cache,
                config,
            }),
        }
    }

    /// Consistent copy of the aggregate.
    pub fn snapshot(&self) -> ReportStream {
        self.inner.read().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    pub fn mutation_count(&self) -> u64 {
        self.inner.changes.current()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.manager.is_active(StreamKind::Report)
    }

    /// Cancel the active report stream. Partial content stays.
    pub fn abort(&self) -> bool {
        self.inner.manager.cancel(StreamKind::Report)
    }

    /// Clear the aggregate. Refused while a report stream is running.
    pub fn reset(&self) -> Result<(), StreamError> {
        if self.is_streaming() {
            return Err(StreamError::AlreadyActive {
                kind: StreamKind::Report.as_str(),
            });
        }
        self.inner.write().reset();
        self.inner.changes.bump();
        Ok(())
    }

    /// Reload the last persisted snapshot. Returns `true` if one was found.
    ///
    /// No stream survives a restart, so a snapshot left mid-stream is closed
    /// as incomplete before it is installed.
    pub async fn restore(&self) -> bool {
        let loaded: Option<ReportStream> = self.inner.persister.load(CURRENT_REPORT_STREAM).await;
        let Some(snapshot) = loaded else {
            return false;
        };
        if self.is_streaming() {
            return false;
        }
        let interrupted = is_interrupted(&snapshot);
        let mut acc =
            ReportAccumulator::from_snapshot(snapshot, self.inner.config.report_defaults.clone());
        if interrupted {
            warn!(
                report_id = %acc.state().report_id,
                "restored report was cut off mid-stream; marking incomplete"
            );
            acc.fail(StreamError::Incomplete.to_string());
        } else {
            debug!(report_id = %acc.state().report_id, "report snapshot restored");
        }
        *self.inner.write() = acc;
        self.inner.changes.bump();
        if interrupted {
            self.inner.persist_snapshot().await;
        }
        true
    }

    /// Load the most-recently-used report list from the store.
    pub async fn load_cache(&self) -> usize {
        match self.inner.cache.load().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "report cache load failed");
                0
            }
        }
    }

    /// A previously completed report, marking it most recently used.
    pub async fn cached(&self, report_id: &str) -> Option<Value> {
        match self.inner.cache.get(report_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!(report_id, error = %e, "report cache read failed");
                None
            }
        }
    }

    pub fn cached_ids(&self) -> Vec<String> {
        self.inner.cache.ids()
    }

    /// The last completed report, from durable storage.
    pub async fn current_report(&self) -> Option<Value> {
        self.inner.persister.load(CURRENT_REPORT).await
    }

    /// Run one report stream for `request` to its end.
    ///
    /// Only a single-flight rejection is returned as `Err`; every other
    /// failure is recorded on the aggregate and returned as
    /// [`StreamOutcome::Failed`].
    pub async fn run(&self, request: Value) -> Result<StreamOutcome, StreamError> {
        let local_id = format!("report_{}", uuid::Uuid::new_v4().simple());
        let guard = self
            .inner
            .manager
            .try_acquire(StreamKind::Report, local_id.as_str(), local_id.as_str())?;

        self.inner.write().reset();
        self.inner.changes.bump();
        info!(stream_id = guard.id(), url = %self.inner.config.report_url, "report stream started");

        let mut sink = ReportSink::new(Arc::clone(&self.inner));
        let outcome = drive(
            self.inner.transport.as_ref(),
            &self.inner.config.report_url,
            &request,
            Framing::Block,
            guard.token(),
            &mut sink,
        )
        .await;

        let state = self.inner.read();
        info!(
            stream_id = guard.id(),
            report_id = %state.state().report_id,
            outcome = outcome.as_str(),
            sections_done = state.state().done_sections(),
            malformed_frames = sink.malformed,
            "report stream finished"
        );
        Ok(outcome)
    }
}

/// Started, but neither finished nor failed.
fn is_interrupted(snapshot: &ReportStream) -> bool {
    snapshot.is_started()
        && !snapshot.done
        && snapshot.error.is_none()
        && snapshot.final_report.is_none()
}

struct ReportSink {
    inner: Arc<ReportInner>,
    frame: BatchedFlush,
    persist: BatchedFlush,
    tolerate_malformed: bool,
    malformed: usize,
}

impl ReportSink {
    fn new(inner: Arc<ReportInner>) -> Self {
        let config = &inner.config;
        Self {
            frame: BatchedFlush::new(config.frame_interval()),
            persist: BatchedFlush::new(config.persist_delay()),
            tolerate_malformed: config.tolerate_malformed_report_frames,
            malformed: 0,
            inner,
        }
    }
}

#[async_trait]
impl StreamSink for ReportSink {
    fn on_frame(&mut self, frame: &str) -> Flow {
        let event: ReportEvent = match parse_event(frame) {
            Ok(event) => event,
            Err(e) if self.tolerate_malformed => {
                self.malformed += 1;
                warn!(error = %e, "skipping undecodable report frame");
                return Flow::Continue;
            }
            Err(e) => {
                let message = self.on_failure(&StreamError::Decode(e));
                return Flow::Stop(StreamOutcome::Failed(message));
            }
        };

        let step = self.inner.write().apply(&event);
        match event {
            ReportEvent::SectionDelta { .. } | ReportEvent::ThinkingDelta { .. } => {
                self.frame.trigger();
            }
            _ => {
                self.frame.take();
                self.inner.changes.bump();
            }
        }
        self.persist.trigger();

        match step {
            ReportStep::Applied | ReportStep::Ignored => Flow::Continue,
            ReportStep::Completed => Flow::Stop(StreamOutcome::Completed),
            ReportStep::Failed(message) => Flow::Stop(StreamOutcome::Failed(message)),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest([self.frame.deadline(), self.persist.deadline()])
    }

    async fn on_deadline(&mut self) {
        if self.frame.take_due() {
            self.inner.changes.bump();
        }
        if self.persist.take_due() {
            self.inner.persist_snapshot().await;
        }
    }

    fn on_failure(&mut self, error: &StreamError) -> String {
        let message = error.to_string();
        self.inner.write().fail(message.clone());
        self.inner.changes.bump();
        message
    }

    async fn finish(&mut self, outcome: &StreamOutcome) {
        self.frame.take();
        self.persist.take();
        self.inner.changes.bump();
        self.inner.persist_snapshot().await;

        if !outcome.is_completed() {
            return;
        }
        let (report_id, final_report, analysis) = {
            let state = self.inner.read();
            let state = state.state();
            (
                state.report_id.clone(),
                state.final_report.clone(),
                state.analysis.clone(),
            )
        };
        let Some(final_report) = final_report else {
            return;
        };
        let persister = &self.inner.persister;
        persister.save(CURRENT_REPORT, &final_report).await;
        match analysis {
            Some(analysis) => persister.save(CURRENT_ANALYSIS, &analysis).await,
            None => persister.remove(CURRENT_ANALYSIS).await,
        };
        if !report_id.is_empty() {
            if let Err(e) = self.inner.cache.put(&report_id, final_report).await {
                warn!(report_id = %report_id, error = %e, "report cache write failed");
            }
        }
    }
}
