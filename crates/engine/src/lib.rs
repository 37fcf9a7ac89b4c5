// crates/engine/src/lib.rs
//! Stream lifecycle and persistence around the ingestion core.

pub mod changes;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod persist;
pub mod pump;
pub mod report;
pub mod throttle;
pub mod transport;

pub use changes::ChangeNotifier;
pub use chat::{ChatService, SendOptions, Subject};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ConfigError, StreamError, TransportError};
pub use manager::{ActiveStream, StreamGuard, StreamKind, StreamManager, StreamOutcome};
pub use persist::Persister;
pub use report::ReportService;
pub use transport::{ByteStream, HttpTransport, Transport};
