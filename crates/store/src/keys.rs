// crates/store/src/keys.rs
//! Well-known storage keys.

/// Every non-draft chat session.
pub const CHAT_SESSIONS: &str = "unified-chat-sessions";
/// Id of the current chat session; absent when that session is an empty draft.
pub const CHAT_CURRENT_SESSION: &str = "unified-chat-current-session";
/// Last completed report.
pub const CURRENT_REPORT: &str = "bazi_current_report";
/// Analysis side channel of the last completed report.
pub const CURRENT_ANALYSIS: &str = "bazi_current_analysis";
/// In-flight report snapshot, restored on start-up.
pub const CURRENT_REPORT_STREAM: &str = "bazi_current_report_stream";
/// Recently used reports keyed by report id.
pub const REPORT_CACHE: &str = "bazi_report_cache";
