//! Export serializer
//!
//! Writes analysis results as CSV tables (whole-session or per-interval) and
//! renders annotation sets back into the annotation file format.

use crate::config::MetricsConfig;
use crate::error::AnalysisError;
use crate::loader::{EVENT_HEADER, SUMMARY_HEADER, TEST_DURATION_KEY};
use crate::session::SessionAnalyzer;
use crate::types::{AnnotationSet, EventKind, IntervalResult, SessionResult, TallySource};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Which results table to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// One row per file
    Standard,
    /// One row per file and window
    Interval,
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer)
}

/// End the current block with an empty line; returns a writer over the same output
fn blank_row<W: Write>(wtr: csv::Writer<W>) -> Result<csv::Writer<W>, AnalysisError> {
    let mut inner = wtr
        .into_inner()
        .map_err(|e| AnalysisError::Io(e.into_error()))?;
    inner.write_all(b"\n")?;
    Ok(csv_writer(inner))
}

/// Open `path` for writing through a buffer
pub fn create_file(path: &Path) -> Result<BufWriter<File>, AnalysisError> {
    Ok(BufWriter::new(File::create(path)?))
}

/// Write the whole-session table: one row per result
pub fn write_session_table<W: Write>(
    writer: W,
    results: &[SessionResult],
    labels: &[String],
    config: &MetricsConfig,
) -> Result<(), AnalysisError> {
    let latency_names: Vec<&str> = config
        .enabled_latency_metrics()
        .map(|m| m.name.as_str())
        .collect();
    let total_names: Vec<&str> = config
        .enabled_total_time_metrics()
        .map(|m| m.name.as_str())
        .collect();
    let n = labels.len();

    let mut wtr = csv_writer(writer);

    let mut sections: Vec<&str> = vec!["", "Duration"];
    sections.extend(std::iter::repeat("").take(n));
    sections.push("Frequency");
    sections.extend(std::iter::repeat("").take(n + latency_names.len() + total_names.len()));
    wtr.write_record(&sections)?;

    let mut columns: Vec<&str> = vec!["animal_id"];
    columns.extend(labels.iter().map(String::as_str));
    columns.push("");
    columns.extend(labels.iter().map(String::as_str));
    columns.push("");
    columns.extend(latency_names.iter().copied());
    columns.extend(total_names.iter().copied());
    wtr.write_record(&columns)?;

    for result in results {
        let mut row: Vec<String> = vec![result.session_id.clone()];
        row.extend(
            labels
                .iter()
                .map(|label| format!("{:.2}", result.behavior(label).duration)),
        );
        row.push(String::new());
        row.extend(
            labels
                .iter()
                .map(|label| result.behavior(label).count.to_string()),
        );
        row.push(String::new());
        row.extend(latency_names.iter().map(|name| {
            format!("{:.2}", result.latency(name).unwrap_or(result.test_duration))
        }));
        row.extend(
            total_names
                .iter()
                .map(|name| format!("{:.2}", result.total_time(name).unwrap_or(0.0))),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the interval table: one row per window, a blank row after each file
pub fn write_interval_table<W: Write>(
    writer: W,
    results: &[IntervalResult],
    labels: &[String],
    config: &MetricsConfig,
    window_minutes: f64,
) -> Result<(), AnalysisError> {
    let total_names: Vec<&str> = config
        .enabled_total_time_metrics()
        .map(|m| m.name.as_str())
        .collect();
    let n = labels.len();
    let pad = n.saturating_sub(1);

    let mut wtr = csv_writer(writer);

    wtr.write_record([format!("Interval analysis ({window_minutes}-minute intervals)")])?;

    let mut sections: Vec<&str> = vec!["", "", "", "", "Duration"];
    sections.extend(std::iter::repeat("").take(pad + 1));
    sections.push("Frequency");
    sections.extend(std::iter::repeat("").take(pad));
    if !total_names.is_empty() {
        sections.extend(std::iter::repeat("").take(total_names.len() + 1));
    }
    wtr.write_record(&sections)?;

    let mut columns: Vec<&str> = vec!["animal_id", "Interval", "Time (min)", ""];
    columns.extend(labels.iter().map(String::as_str));
    columns.push("");
    columns.extend(labels.iter().map(String::as_str));
    if !total_names.is_empty() {
        columns.push("");
        columns.extend(total_names.iter().copied());
    }
    wtr.write_record(&columns)?;

    for result in results {
        for record in &result.records {
            let mut row: Vec<String> = vec![
                result.session_id.clone(),
                record.interval_number.to_string(),
                record.time_label(),
                String::new(),
            ];
            row.extend(
                labels
                    .iter()
                    .map(|label| format!("{:.2}", record.behavior(label).duration)),
            );
            row.push(String::new());
            row.extend(
                labels
                    .iter()
                    .map(|label| record.behavior(label).count.to_string()),
            );
            if !total_names.is_empty() {
                row.push(String::new());
                row.extend(
                    total_names
                        .iter()
                        .map(|name| format!("{:.2}", record.total_time(name).unwrap_or(0.0))),
                );
            }
            wtr.write_record(&row)?;
        }
        wtr = blank_row(wtr)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Render an annotation set in the annotation file format.
///
/// Events are written with 4-decimal times. The summary table is computed
/// from the events when there are any; otherwise the file's own summary rows
/// are passed through unchanged.
pub fn render_annotations(set: &AnnotationSet) -> Result<String, AnalysisError> {
    let mut wtr = csv_writer(Vec::new());

    wtr.write_record(["Metadata"])?;
    let duration = set.metadata_duration().unwrap_or(0.0);
    wtr.write_record([TEST_DURATION_KEY.to_string(), duration.to_string()])?;
    wtr = blank_row(wtr)?;

    if set.has_events() {
        wtr.write_record(EVENT_HEADER.split(','))?;
        for event in set.events() {
            let offset = match event.kind {
                EventKind::RecordingStart => String::new(),
                EventKind::Behavior(_) => format!("{:.4}", event.offset),
            };
            wtr.write_record([
                event.kind.label().to_string(),
                format!("{:.4}", event.onset),
                offset,
            ])?;
        }
        wtr = blank_row(wtr)?;
    }

    let has_summary = set.summary().is_some() || set.behavior_events().next().is_some();
    if has_summary {
        wtr.write_record(SUMMARY_HEADER.split(','))?;
        match SessionAnalyzer::tally_source(set) {
            TallySource::RawEvents => {
                let tallies = SessionAnalyzer::behavior_tallies(set, &[]);
                for label in set.labels() {
                    let tally = tallies.get(label).copied().unwrap_or_default();
                    wtr.write_record([
                        label.to_string(),
                        format!("{:.2}", tally.duration),
                        tally.count.to_string(),
                    ])?;
                }
            }
            TallySource::Summary => {
                for entry in set.summary().unwrap_or_default() {
                    wtr.write_record([
                        entry.label.clone(),
                        entry.duration.to_string(),
                        entry.frequency.to_string(),
                    ])?;
                }
            }
        }
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| AnalysisError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| AnalysisError::Parse(e.to_string()))
}

/// Write an annotation set to `path` in the annotation file format
pub fn write_annotations(path: &Path, set: &AnnotationSet) -> Result<(), AnalysisError> {
    let mut file = create_file(path)?;
    file.write_all(render_annotations(set)?.as_bytes())?;
    file.flush()?;
    Ok(())
}
