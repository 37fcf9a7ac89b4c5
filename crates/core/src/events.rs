// crates/core/src/events.rs
//! Typed wire events for the two stream kinds.
//!
//! Every frame carries one JSON object discriminated by `type`. Unknown types
//! or missing required fields fail to decode rather than defaulting.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;

/// Parse one decoded frame into an event.
pub fn parse_event<T: DeserializeOwned>(frame: &str) -> Result<T, FrameError> {
    serde_json::from_str(frame).map_err(|e| FrameError::from_json(frame, &e))
}

/// One entry of the section plan announced by `report_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPlanWire {
    pub section_id: String,
    pub title: String,
}

/// Events of the multi-section report stream (blank-line framed `data:` blocks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    ReportStart {
        report_id: String,
        schema_version: String,
        sections: Vec<SectionPlanWire>,
    },
    Meta {
        report_id: String,
        #[serde(default)]
        analysis: Value,
        #[serde(default)]
        prompt: Value,
        #[serde(default)]
        chart: Value,
        #[serde(default)]
        knowledge: Value,
    },
    ThinkingDelta {
        report_id: String,
        text: String,
    },
    SectionStart {
        report_id: String,
        section_id: String,
        #[serde(default)]
        title: Option<String>,
    },
    SectionDelta {
        report_id: String,
        section_id: String,
        /// Advisory ordering hint; delivery order is trusted.
        seq: u64,
        delta: String,
        #[serde(default)]
        title: Option<String>,
    },
    SectionPatch {
        report_id: String,
        section_id: String,
        patch: Value,
    },
    SectionDone {
        report_id: String,
        section_id: String,
    },
    ReportDone {
        report_id: String,
        #[serde(default)]
        report: Option<Value>,
        #[serde(default)]
        thinking: Option<String>,
        #[serde(default)]
        dev_info: Option<Value>,
    },
    Error {
        #[serde(default)]
        report_id: Option<String>,
        #[serde(default)]
        message: String,
        #[serde(default)]
        recoverable: Option<bool>,
    },
}

impl ReportEvent {
    /// `report_done` and `error` end consumption of the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReportDone { .. } | Self::Error { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReportStart { .. } => "report_start",
            Self::Meta { .. } => "meta",
            Self::ThinkingDelta { .. } => "thinking_delta",
            Self::SectionStart { .. } => "section_start",
            Self::SectionDelta { .. } => "section_delta",
            Self::SectionPatch { .. } => "section_patch",
            Self::SectionDone { .. } => "section_done",
            Self::ReportDone { .. } => "report_done",
            Self::Error { .. } => "error",
        }
    }
}

/// Events of the turn-based chat stream (one JSON object per line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Delta {
        text: String,
    },
    Done {
        reply: String,
        #[serde(default)]
        thinking: Option<String>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    /// Reasoning side channel; accepted on the wire, not part of the reply.
    Thinking {
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_report_start() {
        let ev: ReportEvent = parse_event(
            r#"{"type":"report_start","report_id":"r1","schema_version":"v1",
                "sections":[{"section_id":"intro","title":"引言"}]}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            ReportEvent::ReportStart {
                report_id: "r1".into(),
                schema_version: "v1".into(),
                sections: vec![SectionPlanWire {
                    section_id: "intro".into(),
                    title: "引言".into(),
                }],
            }
        );
    }

    #[test]
    fn test_parse_section_delta_requires_seq() {
        let missing_seq = r#"{"type":"section_delta","report_id":"r","section_id":"s","delta":"x"}"#;
        let err = parse_event::<ReportEvent>(missing_seq).unwrap_err();
        assert!(matches!(err, FrameError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_parse_report_done_without_report() {
        let ev: ReportEvent = parse_event(r#"{"type":"report_done","report_id":"r"}"#).unwrap();
        assert!(ev.is_terminal());
        let ReportEvent::ReportDone { report, thinking, .. } = ev else {
            panic!("expected report_done");
        };
        assert!(report.is_none());
        assert!(thinking.is_none());
    }

    #[test]
    fn test_parse_error_event_without_report_id() {
        let ev: ReportEvent =
            parse_event(r#"{"type":"error","message":"boom","recoverable":false}"#).unwrap();
        assert_eq!(ev.kind(), "error");
        assert!(ev.is_terminal());
    }

    #[test]
    fn test_unknown_type_is_decode_failure() {
        let err = parse_event::<ReportEvent>(r#"{"type":"surprise","report_id":"r"}"#).unwrap_err();
        assert!(matches!(err, FrameError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_parse_chat_events() {
        assert_eq!(
            parse_event::<ChatEvent>(r#"{"type":"delta","text":"Hi"}"#).unwrap(),
            ChatEvent::Delta { text: "Hi".into() }
        );
        assert_eq!(
            parse_event::<ChatEvent>(r#"{"type":"done","reply":"Hi there"}"#).unwrap(),
            ChatEvent::Done {
                reply: "Hi there".into(),
                thinking: None,
            }
        );
        assert!(parse_event::<ChatEvent>("not json").is_err());
    }
}
