// crates/core/src/defaults.rs
//! Copy and fallback values the engine fills in when a stream omits them.

use serde::{Deserialize, Serialize};

/// Header values for reports assembled on the client side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportDefaults {
    /// Used when the stream never announced a schema version.
    pub schema_version: String,
    pub language: String,
    pub tone: String,
    pub disclaimer: String,
    /// JSON pointer into the `meta.prompt` value locating the input references.
    pub input_refs_pointer: String,
    /// Shown when an `error` event arrives without a message.
    pub error_message: String,
}

impl Default for ReportDefaults {
    fn default() -> Self {
        Self {
            schema_version: "bazi_report_v1".into(),
            language: "zh-CN".into(),
            tone: "温和中肯".into(),
            disclaimer: "本报告仅基于已提供事实进行解读，不构成确定性承诺或医疗/投资建议。".into(),
            input_refs_pointer: "/user/input_refs_backend".into(),
            error_message: "生成报告失败".into(),
        }
    }
}

/// Chat-side copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatDefaults {
    /// Prepended to the failure message written into the assistant reply.
    pub error_prefix: String,
    /// Shown when an `error` event arrives without a message.
    pub error_message: String,
    /// Preview text of a fresh session.
    pub new_session_preview: String,
    pub llm_provider: String,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            error_prefix: "出错了：".into(),
            error_message: "对话失败".into(),
            new_session_preview: "新对话".into(),
            llm_provider: "openai".into(),
        }
    }
}
