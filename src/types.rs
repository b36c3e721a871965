//! Core data types
//!
//! Events and annotation sets produced by the loader, and the result records
//! produced by the session and interval analyzers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Label of the session-origin marker in annotation files
pub const RECORDING_START: &str = "RecordingStart";

/// What an event marks: a behavior occurrence or the recording origin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "label", rename_all = "snake_case")]
pub enum EventKind {
    Behavior(String),
    RecordingStart,
}

impl EventKind {
    /// Classify a raw label from the event column
    pub fn from_label(label: &str) -> Self {
        if label == RECORDING_START {
            EventKind::RecordingStart
        } else {
            EventKind::Behavior(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            EventKind::Behavior(label) => label.as_str(),
            EventKind::RecordingStart => RECORDING_START,
        }
    }
}

/// A single annotated event, times in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub onset: f64,
    /// For `RecordingStart` this equals `onset` and carries no meaning
    pub offset: f64,
}

impl Event {
    pub fn behavior(label: impl Into<String>, onset: f64, offset: f64) -> Self {
        Self {
            kind: EventKind::Behavior(label.into()),
            onset,
            offset,
        }
    }

    pub fn recording_start(onset: f64) -> Self {
        Self {
            kind: EventKind::RecordingStart,
            onset,
            offset: onset,
        }
    }

    /// Behavior label, or `None` for the origin marker
    pub fn behavior_label(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Behavior(label) => Some(label.as_str()),
            EventKind::RecordingStart => None,
        }
    }

    pub fn is_behavior(&self, label: &str) -> bool {
        self.behavior_label() == Some(label)
    }

    pub fn duration(&self) -> f64 {
        self.offset - self.onset
    }
}

/// Duration and occurrence count for one behavior
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BehaviorTally {
    /// Total duration in seconds
    pub duration: f64,
    /// Number of occurrences
    pub count: u32,
}

/// One row of a precomputed `Behavior,Duration,Frequency` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub label: String,
    pub duration: f64,
    pub frequency: u32,
}

/// A row the loader dropped, with enough context to find it in the file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    /// 1-based line number in the source file
    pub line: usize,
    pub label: Option<String>,
    pub row: String,
    pub reason: String,
}

/// Parsed contents of one annotation file. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnnotationSet {
    events: Vec<Event>,
    summary: Option<Vec<SummaryEntry>>,
    metadata_duration: Option<f64>,
    row_issues: Vec<RowIssue>,
}

impl AnnotationSet {
    pub fn new(
        events: Vec<Event>,
        summary: Option<Vec<SummaryEntry>>,
        metadata_duration: Option<f64>,
    ) -> Self {
        Self {
            events,
            summary,
            metadata_duration,
            row_issues: Vec::new(),
        }
    }

    pub(crate) fn with_row_issues(mut self, row_issues: Vec<RowIssue>) -> Self {
        self.row_issues = row_issues;
        self
    }

    /// All events in file order, including `RecordingStart` markers
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Precomputed summary rows in file order, if the file had that section
    pub fn summary(&self) -> Option<&[SummaryEntry]> {
        self.summary.as_deref()
    }

    /// Value of the `Test Duration (seconds)` metadata line
    pub fn metadata_duration(&self) -> Option<f64> {
        self.metadata_duration
    }

    pub fn row_issues(&self) -> &[RowIssue] {
        &self.row_issues
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Behavior events only, in file order
    pub fn behavior_events(&self) -> impl Iterator<Item = &Event> {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Behavior(_)))
    }

    /// Onsets of every `RecordingStart` marker, in file order
    pub fn recording_starts(&self) -> impl Iterator<Item = f64> + '_ {
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::RecordingStart)
            .map(|e| e.onset)
    }

    /// Behavior labels in first-seen order: event column first, then summary
    pub fn labels(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        let from_events = self.behavior_events().filter_map(|e| e.behavior_label());
        let from_summary = self
            .summary
            .iter()
            .flatten()
            .map(|entry| entry.label.as_str());
        for label in from_events.chain(from_summary) {
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
        seen
    }
}

/// Where the per-behavior tallies of a session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TallySource {
    RawEvents,
    Summary,
}

/// Computed value of one named metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub name: String,
    pub value: f64,
}

fn find_metric(values: &[MetricValue], name: &str) -> Option<f64> {
    values.iter().find(|m| m.name == name).map(|m| m.value)
}

/// Whole-session metrics for one annotation file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub source_path: String,
    /// Resolved session length in seconds
    pub test_duration: f64,
    pub source: TallySource,
    pub behaviors: BTreeMap<String, BehaviorTally>,
    /// One value per enabled latency metric, in configuration order
    pub latencies: Vec<MetricValue>,
    /// One value per enabled total-time metric, in configuration order
    pub total_times: Vec<MetricValue>,
    pub analyzed_at: DateTime<Utc>,
}

impl SessionResult {
    /// Tally for a behavior; zero when the behavior never occurred
    pub fn behavior(&self, label: &str) -> BehaviorTally {
        self.behaviors.get(label).copied().unwrap_or_default()
    }

    pub fn latency(&self, name: &str) -> Option<f64> {
        find_metric(&self.latencies, name)
    }

    pub fn total_time(&self, name: &str) -> Option<f64> {
        find_metric(&self.total_times, name)
    }
}

/// Metrics for one time window of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    /// 1-based window index
    pub interval_number: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub behaviors: BTreeMap<String, BehaviorTally>,
    pub total_times: Vec<MetricValue>,
}

impl IntervalRecord {
    pub fn behavior(&self, label: &str) -> BehaviorTally {
        self.behaviors.get(label).copied().unwrap_or_default()
    }

    pub fn total_time(&self, name: &str) -> Option<f64> {
        find_metric(&self.total_times, name)
    }

    /// Human-readable range in minutes, e.g. `"0.0-5.0"`
    pub fn time_label(&self) -> String {
        format!("{:.1}-{:.1}", self.start_time / 60.0, self.end_time / 60.0)
    }
}

/// Windowed breakdown of one annotation file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalResult {
    pub session_id: String,
    pub source_path: String,
    /// Window width in seconds
    pub window_secs: f64,
    pub records: Vec<IntervalRecord>,
}

/// Session identifier for a file: its stem without an `_annotations` suffix
pub fn session_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    match stem.strip_suffix("_annotations") {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => stem,
    }
}
