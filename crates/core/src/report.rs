// crates/core/src/report.rs
//! Multi-section report state, rebuilt incrementally from [`ReportEvent`]s.
//!
//! `ReportAccumulator` is fed one decoded event at a time and keeps the
//! [`ReportStream`] aggregate coherent after every step, so a reader that
//! snapshots it mid-stream always sees a consistent partial report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{trace, warn};

use crate::defaults::ReportDefaults;
use crate::events::ReportEvent;
use crate::merge::merge;

/// Per-section lifecycle. `Error` is sticky: nothing moves a section out of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    #[default]
    Idle,
    Generating,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPlan {
    pub section_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionState {
    pub section_id: String,
    pub title: String,
    pub status: SectionStatus,
    /// Append-only accumulated markdown.
    pub content_md: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SectionState {
    fn new(section_id: &str, title: Option<&str>) -> Self {
        Self {
            section_id: section_id.to_string(),
            title: title
                .filter(|t| !t.is_empty())
                .unwrap_or(section_id)
                .to_string(),
            status: SectionStatus::Idle,
            content_md: String::new(),
            structured: None,
            error: None,
        }
    }

    fn mark_generating(&mut self) {
        if self.status != SectionStatus::Error {
            self.status = SectionStatus::Generating;
        }
    }
}

/// The report aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportStream {
    pub report_id: String,
    pub schema_version: String,
    /// Canonical section order, fixed by `report_start`.
    pub sections_plan: Vec<SectionPlan>,
    pub sections: BTreeMap<String, SectionState>,
    /// Reasoning side channel; never part of the final report.
    pub thinking: String,
    pub prompt: Option<Value>,
    pub analysis: Option<Value>,
    pub done: bool,
    pub error: Option<String>,
    /// Authoritative terminal value once set.
    pub final_report: Option<Value>,
}

impl ReportStream {
    /// Sections in plan order, followed by any section the plan never named
    /// (ordered by id).
    pub fn sections_in_order(&self) -> Vec<&SectionState> {
        let planned = self
            .sections_plan
            .iter()
            .filter_map(|p| self.sections.get(&p.section_id));
        let extra = self
            .sections
            .values()
            .filter(|s| !self.sections_plan.iter().any(|p| p.section_id == s.section_id));
        planned.chain(extra).collect()
    }

    /// Count of sections that reached `Done`.
    pub fn done_sections(&self) -> usize {
        self.sections
            .values()
            .filter(|s| s.status == SectionStatus::Done)
            .count()
    }

    pub fn is_started(&self) -> bool {
        !self.report_id.is_empty() || !self.sections_plan.is_empty()
    }
}

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStep {
    Applied,
    /// Event arrived after the aggregate was finalized, or repeated a one-shot event.
    Ignored,
    Completed,
    Failed(String),
}

/// Reducer that owns the [`ReportStream`] while a stream is being consumed.
#[derive(Debug, Clone)]
pub struct ReportAccumulator {
    state: ReportStream,
    defaults: ReportDefaults,
    started: bool,
}

impl ReportAccumulator {
    pub fn new(defaults: ReportDefaults) -> Self {
        Self {
            state: ReportStream::default(),
            defaults,
            started: false,
        }
    }

    /// Resume from a persisted snapshot.
    pub fn from_snapshot(state: ReportStream, defaults: ReportDefaults) -> Self {
        let started = state.is_started();
        Self {
            state,
            defaults,
            started,
        }
    }

    pub fn state(&self) -> &ReportStream {
        &self.state
    }

    pub fn snapshot(&self) -> ReportStream {
        self.state.clone()
    }

    /// Clear everything; required before a new stream targets this aggregate.
    pub fn reset(&mut self) {
        self.state = ReportStream::default();
        self.started = false;
    }

    /// Apply one event, using the current time for any client-side assembly.
    pub fn apply(&mut self, event: &ReportEvent) -> ReportStep {
        self.apply_at(event, Utc::now())
    }

    /// Apply one event; `now` stamps a report assembled from streamed sections.
    pub fn apply_at(&mut self, event: &ReportEvent, now: DateTime<Utc>) -> ReportStep {
        if self.state.final_report.is_some() {
            trace!(kind = event.kind(), "event after final report ignored");
            return ReportStep::Ignored;
        }

        match event {
            ReportEvent::ReportStart {
                report_id,
                schema_version,
                sections,
            } => {
                if self.started {
                    warn!(
                        report_id = %report_id,
                        current = %self.state.report_id,
                        "repeated report_start ignored; section plan is fixed"
                    );
                    return ReportStep::Ignored;
                }
                self.started = true;
                self.state.report_id = report_id.clone();
                self.state.schema_version = schema_version.clone();
                self.state.sections_plan = sections
                    .iter()
                    .map(|s| SectionPlan {
                        section_id: s.section_id.clone(),
                        title: s.title.clone(),
                    })
                    .collect();
                for plan in sections {
                    self.ensure_section(&plan.section_id, Some(&plan.title));
                }
            }
            ReportEvent::Meta {
                analysis, prompt, ..
            } => {
                self.state.analysis = non_null(analysis);
                self.state.prompt = non_null(prompt);
            }
            ReportEvent::ThinkingDelta { text, .. } => {
                self.state.thinking.push_str(text);
            }
            ReportEvent::SectionStart {
                section_id, title, ..
            } => {
                self.ensure_section(section_id, title.as_deref())
                    .mark_generating();
            }
            ReportEvent::SectionDelta {
                section_id,
                seq,
                delta,
                title,
                ..
            } => {
                trace!(section_id = %section_id, seq, len = delta.len(), "section delta");
                let section = self.ensure_section(section_id, title.as_deref());
                section.mark_generating();
                section.content_md.push_str(delta);
            }
            ReportEvent::SectionPatch {
                section_id, patch, ..
            } => {
                let section = self.ensure_section(section_id, None);
                if patch.is_object() {
                    let body = patch.get("structured").unwrap_or(patch);
                    let existing = section
                        .structured
                        .take()
                        .unwrap_or_else(|| Value::Object(Map::new()));
                    section.structured = Some(merge(existing, body));
                }
            }
            ReportEvent::SectionDone { section_id, .. } => {
                let section = self.ensure_section(section_id, None);
                if section.status != SectionStatus::Error {
                    section.status = SectionStatus::Done;
                }
            }
            ReportEvent::ReportDone {
                report, thinking, ..
            } => {
                self.state.done = true;
                if let Some(thinking) = thinking.as_deref().filter(|t| !t.is_empty()) {
                    self.state.thinking = thinking.to_string();
                }
                let final_report = match report {
                    Some(report) if is_complete_report(report) => report.clone(),
                    _ => self.assemble_final_report(now),
                };
                self.state.final_report = Some(final_report);
                return ReportStep::Completed;
            }
            ReportEvent::Error { message, .. } => {
                let message = if message.is_empty() {
                    self.defaults.error_message.clone()
                } else {
                    message.clone()
                };
                self.fail(message.clone());
                return ReportStep::Failed(message);
            }
        }
        ReportStep::Applied
    }

    /// Record a terminal failure. Content already received stays in place;
    /// sections still generating become `Error`.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        for section in self.state.sections.values_mut() {
            if section.status == SectionStatus::Generating {
                section.status = SectionStatus::Error;
                section.error = Some(message.clone());
            }
        }
        self.state.error = Some(message);
        self.state.done = false;
    }

    /// Build the final report from what has been streamed so far, walking the
    /// section plan in order.
    pub fn assemble_final_report(&self, generated_at: DateTime<Utc>) -> Value {
        let version = if self.state.schema_version.is_empty() {
            self.defaults.schema_version.as_str()
        } else {
            self.state.schema_version.as_str()
        };

        let input_refs = self
            .state
            .prompt
            .as_ref()
            .and_then(|p| p.pointer(&self.defaults.input_refs_pointer))
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let sections: Vec<Value> = self
            .state
            .sections_plan
            .iter()
            .map(|plan| {
                let section = self.state.sections.get(&plan.section_id);
                let mut entry = json!({
                    "id": plan.section_id,
                    "title": plan.title,
                    "content_md": section.map(|s| s.content_md.as_str()).unwrap_or_default(),
                });
                if let Some(structured) = section.and_then(|s| s.structured.clone()) {
                    entry["structured"] = structured;
                }
                entry
            })
            .collect();

        json!({
            "meta": {
                "version": version,
                "generated_at": generated_at.to_rfc3339(),
                "language": self.defaults.language,
                "tone": self.defaults.tone,
                "disclaimer": self.defaults.disclaimer,
            },
            "input_refs": input_refs,
            "sections": sections,
        })
    }

    fn ensure_section(&mut self, section_id: &str, title: Option<&str>) -> &mut SectionState {
        let section = self
            .state
            .sections
            .entry(section_id.to_string())
            .or_insert_with(|| SectionState::new(section_id, title));
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            if section.title.is_empty() {
                section.title = title.to_string();
            }
        }
        section
    }
}

/// A server-supplied report is adopted only if it has the three top-level
/// fields of a finished report.
pub fn is_complete_report(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.contains_key("meta") && o.contains_key("input_refs") && o.contains_key("sections"))
}

fn non_null(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}
