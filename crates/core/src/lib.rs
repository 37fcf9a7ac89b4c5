// crates/core/src/lib.rs
pub mod chat;
pub mod defaults;
pub mod error;
pub mod events;
pub mod frame;
pub mod merge;
pub mod report;

pub use chat::*;
pub use defaults::*;
pub use error::*;
pub use events::*;
pub use frame::*;
pub use merge::merge;
pub use report::*;
