//! Annotation record loader
//!
//! Parses annotation files into an [`AnnotationSet`]. A file may hold, in any
//! combination, a raw `Event,Onset,Offset` table, a precomputed
//! `Behavior,Duration,Frequency` table and a `Test Duration (seconds)` line.
//! Bad rows are dropped and recorded as row issues; a file with neither table
//! is a parse error.

use crate::catalog::BehaviorCatalog;
use crate::error::AnalysisError;
use crate::types::{AnnotationSet, Event, EventKind, RowIssue, SummaryEntry};
use log::{debug, info, warn};
use std::fs;
use std::path::Path;

/// Header of the raw event table
pub const EVENT_HEADER: &str = "Event,Onset,Offset";

/// Header of the precomputed summary table
pub const SUMMARY_HEADER: &str = "Behavior,Duration,Frequency";

/// Key of the metadata line carrying the session length
pub const TEST_DURATION_KEY: &str = "Test Duration (seconds)";

/// Loader for annotation files
pub struct AnnotationLoader;

impl AnnotationLoader {
    /// Read and parse `path`, adding newly seen labels to `catalog`
    pub fn load(path: &Path, catalog: &mut BehaviorCatalog) -> Result<AnnotationSet, AnalysisError> {
        debug!("Loading file: {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::load_content(&path.display().to_string(), &content, catalog)
    }

    /// Parse already-read `content`, adding newly seen labels to `catalog`.
    /// `source` only labels log lines.
    pub fn load_content(
        source: &str,
        content: &str,
        catalog: &mut BehaviorCatalog,
    ) -> Result<AnnotationSet, AnalysisError> {
        let set = Self::parse(content).map_err(|e| {
            warn!("Failed to parse {source}: {e}");
            e
        })?;

        for issue in set.row_issues() {
            warn!(
                "{source}: dropped line {} (behavior {:?}, row {:?}): {}",
                issue.line,
                issue.label.as_deref().unwrap_or(""),
                issue.row,
                issue.reason
            );
        }

        let added = catalog.observe_all(set.labels());
        info!(
            "Loaded {source}: {} events, summary: {}, {} new behaviors",
            set.events().len(),
            set.summary().map_or(0, |s| s.len()),
            added
        );
        Ok(set)
    }

    /// Parse annotation file content without touching any catalog
    pub fn parse(content: &str) -> Result<AnnotationSet, AnalysisError> {
        let lines: Vec<&str> = content.lines().collect();
        let mut issues = Vec::new();

        let metadata_duration = find_test_duration(&lines);
        if let Some(duration) = metadata_duration {
            debug!("Extracted test duration from metadata: {duration} seconds");
        }

        let event_header = find_header(&lines, EVENT_HEADER);
        let summary_header = find_header(&lines, SUMMARY_HEADER);

        if event_header.is_none() && summary_header.is_none() {
            return Err(AnalysisError::Parse(format!(
                "no '{EVENT_HEADER}' or '{SUMMARY_HEADER}' section found"
            )));
        }

        let events = match event_header {
            Some(header) => parse_event_rows(&lines, header, &mut issues),
            None => Vec::new(),
        };

        let summary = summary_header.map(|header| parse_summary_rows(&lines, header, &mut issues));

        Ok(AnnotationSet::new(events, summary, metadata_duration).with_row_issues(issues))
    }
}

fn find_header(lines: &[&str], header: &str) -> Option<usize> {
    lines.iter().position(|line| line.trim_start().starts_with(header))
}

/// First `Test Duration (seconds), <number>` line with a positive value
fn find_test_duration(lines: &[&str]) -> Option<f64> {
    lines.iter().find_map(|line| {
        let rest = line.trim().strip_prefix(TEST_DURATION_KEY)?;
        let value = rest.trim_start().strip_prefix(',')?.trim();
        let value = value.split(',').next().unwrap_or("").trim().trim_matches('"');
        match value.parse::<f64>() {
            Ok(duration) if duration.is_finite() && duration > 0.0 => Some(duration),
            Ok(_) => None,
            Err(_) => {
                warn!("Failed to parse test duration from metadata: {value:?}");
                None
            }
        }
    })
}

/// Split one delimited line into trimmed fields, honoring quotes
fn split_fields(line: &str) -> Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

fn parse_time(field: Option<&String>) -> Option<f64> {
    field
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_event_rows(lines: &[&str], header: usize, issues: &mut Vec<RowIssue>) -> Vec<Event> {
    let mut events = Vec::new();

    for (index, line) in lines.iter().enumerate().skip(header + 1) {
        if line.trim().is_empty() || line.trim_start().starts_with("Behavior,") {
            debug!("Found end of event data at line {}", index + 1);
            break;
        }
        match parse_event_row(line) {
            Ok(event) => events.push(event),
            Err((label, reason)) => issues.push(RowIssue {
                line: index + 1,
                label,
                row: line.to_string(),
                reason,
            }),
        }
    }

    debug!("Extracted raw event data - {} rows", events.len());
    events
}

fn parse_event_row(line: &str) -> Result<Event, (Option<String>, String)> {
    let fields = split_fields(line).map_err(|e| (None, e.to_string()))?;
    let label = fields.first().cloned().unwrap_or_default();
    if label.is_empty() {
        return Err((None, "empty event label".to_string()));
    }

    let onset = parse_time(fields.get(1))
        .ok_or_else(|| (Some(label.clone()), "onset is not a number".to_string()))?;

    match EventKind::from_label(&label) {
        EventKind::RecordingStart => Ok(Event::recording_start(onset)),
        EventKind::Behavior(_) => {
            let offset = parse_time(fields.get(2))
                .ok_or_else(|| (Some(label.clone()), "offset is not a number".to_string()))?;
            if offset < onset {
                return Err((
                    Some(label),
                    format!("offset {offset} is before onset {onset}"),
                ));
            }
            Ok(Event::behavior(label, onset, offset))
        }
    }
}

fn parse_summary_rows(
    lines: &[&str],
    header: usize,
    issues: &mut Vec<RowIssue>,
) -> Vec<SummaryEntry> {
    let mut entries: Vec<SummaryEntry> = Vec::new();

    for (index, line) in lines.iter().enumerate().skip(header + 1) {
        if line.trim().is_empty() {
            break;
        }
        let mut issue = |label: Option<String>, reason: String| {
            issues.push(RowIssue {
                line: index + 1,
                label,
                row: line.to_string(),
                reason,
            })
        };

        let fields = match split_fields(line) {
            Ok(fields) => fields,
            Err(e) => {
                issue(None, e.to_string());
                continue;
            }
        };
        if fields.len() < 3 {
            issue(fields.first().cloned(), "expected name,duration,frequency".to_string());
            continue;
        }

        let label = fields[0].clone();
        if label.is_empty() {
            warn!("Skipping empty behavior name in summary data line: {line}");
            continue;
        }
        if EventKind::from_label(&label) == EventKind::RecordingStart {
            continue;
        }

        let duration = match parse_summary_duration(&fields[1]) {
            Some(duration) => duration,
            None => {
                issue(Some(label), format!("invalid duration {:?}", fields[1]));
                continue;
            }
        };
        let frequency = match parse_summary_frequency(&fields[2]) {
            Some(frequency) => frequency,
            None => {
                issue(Some(label), format!("invalid frequency {:?}", fields[2]));
                continue;
            }
        };

        debug!("Extracted summary: {label} - Duration: {duration}, Frequency: {frequency}");
        if let Some(existing) = entries.iter_mut().find(|e| e.label == label) {
            warn!("Duplicate summary row for {label:?}; keeping the last one");
            existing.duration = duration;
            existing.frequency = frequency;
        } else {
            entries.push(SummaryEntry {
                label,
                duration,
                frequency,
            });
        }
    }

    entries
}

fn parse_summary_duration(field: &str) -> Option<f64> {
    if field.is_empty() {
        return Some(0.0);
    }
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_summary_frequency(field: &str) -> Option<u32> {
    if field.is_empty() {
        return Some(0);
    }
    field.parse::<u32>().ok().or_else(|| {
        // Spreadsheet round-trips turn counts into "3.0"
        field
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
            .map(|v| v as u32)
    })
}
