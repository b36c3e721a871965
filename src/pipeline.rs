//! Analysis pipeline orchestration
//!
//! [`Analyzer`] owns the behavior catalog, the metrics configuration and the
//! latest results. A batch runs files one at a time: load → catalog update →
//! session analysis → optional interval analysis. A failure on one file is
//! recorded in the [`LoadReport`] and the rest of the batch continues.

use crate::catalog::BehaviorCatalog;
use crate::config::MetricsConfig;
use crate::error::AnalysisError;
use crate::export::{self, ExportMode};
use crate::interval::IntervalAnalyzer;
use crate::loader::AnnotationLoader;
use crate::session::SessionAnalyzer;
use crate::types::{session_id_for, AnnotationSet, IntervalResult, RowIssue, SessionResult};
use log::{error, info, warn};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// What was loaded from one file
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub session_id: String,
    pub event_count: usize,
    pub has_summary: bool,
    /// Rows dropped during parsing
    pub row_issues: Vec<RowIssue>,
}

/// Result of loading one file of a batch
#[derive(Debug)]
pub struct FileOutcome {
    pub path: String,
    pub outcome: Result<FileSummary, AnalysisError>,
}

/// Per-file outcomes of a batch load, in input order
#[derive(Debug, Default)]
pub struct LoadReport {
    pub outcomes: Vec<FileOutcome>,
}

impl LoadReport {
    /// True when at least one file loaded
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().any(|o| o.outcome.is_ok())
    }

    pub fn loaded(&self) -> impl Iterator<Item = (&str, &FileSummary)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.outcome.as_ref().ok().map(|s| (o.path.as_str(), s)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &AnalysisError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.outcome.as_ref().err().map(|e| (o.path.as_str(), e)))
    }
}

#[derive(Debug, Clone)]
struct LoadedSession {
    path: String,
    session_id: String,
    set: AnnotationSet,
}

/// Stateful analysis engine for one batch of annotation files
#[derive(Debug, Default)]
pub struct Analyzer {
    catalog: BehaviorCatalog,
    metrics_config: MetricsConfig,
    interval_minutes: Option<f64>,
    test_duration_override: Option<f64>,
    sessions: Vec<LoadedSession>,
    results: Vec<SessionResult>,
    interval_results: Vec<IntervalResult>,
}

impl Analyzer {
    /// Create an analyzer with the built-in metrics configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer with a specific metrics configuration
    pub fn with_metrics_config(metrics_config: MetricsConfig) -> Self {
        Self {
            metrics_config,
            ..Self::default()
        }
    }

    pub fn metrics_config(&self) -> &MetricsConfig {
        &self.metrics_config
    }

    /// Mutable access for CRUD operations. Results are not recomputed until
    /// [`Analyzer::analyze`] runs again.
    pub fn metrics_config_mut(&mut self) -> &mut MetricsConfig {
        &mut self.metrics_config
    }

    pub fn set_metrics_config(&mut self, metrics_config: MetricsConfig) {
        self.metrics_config = metrics_config;
        info!("Updated metrics configuration");
    }

    /// Enable interval analysis with windows of `minutes`, or disable it with `None`
    pub fn set_interval_minutes(&mut self, minutes: Option<f64>) -> Result<(), AnalysisError> {
        if let Some(minutes) = minutes {
            IntervalAnalyzer::window_secs(minutes)?;
        }
        info!("Setting interval analysis: {minutes:?} minutes");
        self.interval_minutes = minutes;
        Ok(())
    }

    pub fn interval_minutes(&self) -> Option<f64> {
        self.interval_minutes
    }

    /// Use `seconds` as every session's length instead of deriving it per file
    pub fn set_test_duration_override(&mut self, seconds: Option<f64>) -> Result<(), AnalysisError> {
        if let Some(seconds) = seconds {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(AnalysisError::Config(format!(
                    "test duration must be a positive number of seconds, got {seconds}"
                )));
            }
        }
        self.test_duration_override = seconds;
        Ok(())
    }

    pub fn catalog(&self) -> &BehaviorCatalog {
        &self.catalog
    }

    /// Whole-session results from the latest analysis, in load order
    pub fn results(&self) -> &[SessionResult] {
        &self.results
    }

    /// Interval results from the latest analysis; empty when disabled
    pub fn interval_results(&self) -> &[IntervalResult] {
        &self.interval_results
    }

    /// Read, parse and analyze a batch of files, replacing any previous batch
    pub fn load_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> LoadReport {
        info!("Loading {} file(s)", paths.len());
        let mut contents = Vec::with_capacity(paths.len());
        let mut read_failures = Vec::new();

        for (index, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            match fs::read_to_string(path) {
                Ok(content) => contents.push((index, path.display().to_string(), content)),
                Err(e) => {
                    error!("Failed to load file {}: {e}", path.display());
                    read_failures.push((
                        index,
                        FileOutcome {
                            path: path.display().to_string(),
                            outcome: Err(AnalysisError::Io(e)),
                        },
                    ));
                }
            }
        }

        let loaded = self.load_contents(contents.iter().map(|(_, p, c)| (p.clone(), c.clone())));

        // Stitch read failures back in input order
        let mut ordered: Vec<(usize, FileOutcome)> = contents
            .iter()
            .map(|(index, _, _)| *index)
            .zip(loaded.outcomes)
            .chain(read_failures)
            .collect();
        ordered.sort_by_key(|(index, _)| *index);

        LoadReport {
            outcomes: ordered.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }

    /// Parse and analyze already-read `(path, content)` pairs, replacing any
    /// previous batch
    pub fn load_contents<I>(&mut self, files: I) -> LoadReport
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.sessions.clear();
        self.results.clear();
        self.interval_results.clear();
        self.catalog.reset();

        let mut report = LoadReport::default();

        for (path, content) in files {
            let session_id = session_id_for(Path::new(&path));
            let outcome = match AnnotationLoader::load_content(&path, &content, &mut self.catalog) {
                Ok(set) => {
                    let summary = FileSummary {
                        session_id: session_id.clone(),
                        event_count: set.events().len(),
                        has_summary: set.summary().is_some(),
                        row_issues: set.row_issues().to_vec(),
                    };
                    self.sessions.push(LoadedSession {
                        path: path.clone(),
                        session_id,
                        set,
                    });
                    Ok(summary)
                }
                Err(e) => {
                    error!("Failed to load file {path}: {e}");
                    Err(e)
                }
            };
            report.outcomes.push(FileOutcome { path, outcome });
        }

        if report.is_success() {
            let discovered = self.catalog.discovered();
            if !discovered.is_empty() {
                info!(
                    "Added {} custom behaviors to analysis: {:?}",
                    discovered.len(),
                    discovered
                );
            }
            self.analyze();
        } else {
            warn!("No files loaded");
        }

        report
    }

    /// Recompute every result from the loaded annotation sets
    pub fn analyze(&mut self) {
        self.results.clear();
        self.interval_results.clear();

        if self.sessions.is_empty() {
            warn!("No data to analyze");
            return;
        }

        let labels = self.catalog.snapshot();

        for session in &self.sessions {
            let result = SessionAnalyzer::analyze(
                &session.session_id,
                &session.path,
                &session.set,
                &self.metrics_config,
                &labels,
                self.test_duration_override,
            );

            if let Some(minutes) = self.interval_minutes {
                match IntervalAnalyzer::analyze(
                    &session.session_id,
                    &session.path,
                    &session.set,
                    &self.metrics_config,
                    &labels,
                    result.test_duration,
                    minutes,
                ) {
                    Ok(intervals) => self.interval_results.push(intervals),
                    Err(e) => error!("Interval analysis failed for {}: {e}", session.path),
                }
            }

            self.results.push(result);
        }

        info!("Analyzed {} file(s)", self.results.len());
    }

    /// Interval mode when interval analysis produced results, else standard
    pub fn default_export_mode(&self) -> ExportMode {
        if self.interval_minutes.is_some() && !self.interval_results.is_empty() {
            ExportMode::Interval
        } else {
            ExportMode::Standard
        }
    }

    /// Write the results table for `mode` to `path`
    pub fn export(&self, path: &Path, mode: ExportMode) -> Result<(), AnalysisError> {
        let mut file = export::create_file(path)?;
        self.export_to_writer(&mut file, mode)
            .and_then(|()| file.flush().map_err(AnalysisError::from))
            .map_err(|e| {
                error!("Failed to export summary to {}: {e}", path.display());
                e
            })?;
        info!("Exported {:?} summary table to {}", mode, path.display());
        Ok(())
    }

    /// Write the results table for `mode` to any writer
    pub fn export_to_writer<W: Write>(&self, writer: W, mode: ExportMode) -> Result<(), AnalysisError> {
        let labels = self.catalog.labels();
        match mode {
            ExportMode::Standard => {
                export::write_session_table(writer, &self.results, labels, &self.metrics_config)
            }
            ExportMode::Interval => {
                let minutes = self.interval_minutes.ok_or_else(|| {
                    AnalysisError::Config("interval analysis is not enabled".to_string())
                })?;
                export::write_interval_table(
                    writer,
                    &self.interval_results,
                    labels,
                    &self.metrics_config,
                    minutes,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LatencyMetric, TotalTimeMetric};
    use pretty_assertions::assert_eq;

    const MOUSE_ONE: &str = "Metadata\n\
Test Duration (seconds),0\n\
\n\
Event,Onset,Offset\n\
RecordingStart,5.0000,\n\
Attack bites,12.0000,15.0000\n\
Attack bites,14.0000,20.0000\n\
Digging,40.0000,65.0000\n\
\n\
Behavior,Duration,Frequency\n\
Attack bites,9.00,2\n\
Digging,25.00,1\n";

    const MOUSE_TWO: &str = "Behavior,Duration,Frequency\n\
Chasing,30.00,3\n\
Freezing,12.50,2\n";

    fn batch() -> Vec<(String, String)> {
        vec![
            ("data/mouse1_annotations.csv".to_string(), MOUSE_ONE.to_string()),
            ("data/broken.csv".to_string(), "not,an,annotation\n".to_string()),
            ("data/mouse2.csv".to_string(), MOUSE_TWO.to_string()),
        ]
    }

    #[test]
    fn test_batch_isolates_failures() {
        let mut analyzer = Analyzer::new();
        let report = analyzer.load_contents(batch());

        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 3);
        let failures: Vec<&str> = report.failures().map(|(path, _)| path).collect();
        assert_eq!(failures, vec!["data/broken.csv"]);
        assert!(matches!(
            report.outcomes[1].outcome,
            Err(AnalysisError::Parse(_))
        ));

        let ids: Vec<&str> = analyzer.results().iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["mouse1", "mouse2"]);
    }

    #[test]
    fn test_catalog_collects_discovered_labels_in_order() {
        let mut analyzer = Analyzer::new();
        analyzer.load_contents(batch());
        assert_eq!(
            analyzer.catalog().discovered(),
            &["Digging".to_string(), "Freezing".to_string()]
        );
    }

    #[test]
    fn test_reload_resets_catalog_and_results() {
        let mut analyzer = Analyzer::new();
        analyzer.load_contents(batch());
        analyzer.load_contents(vec![("m2.csv".to_string(), MOUSE_TWO.to_string())]);
        assert_eq!(analyzer.results().len(), 1);
        assert_eq!(analyzer.catalog().discovered(), &["Freezing".to_string()]);
    }

    #[test]
    fn test_session_metrics() {
        let mut analyzer = Analyzer::new();
        analyzer.load_contents(batch());
        let mouse1 = &analyzer.results()[0];

        // Zero metadata falls through to RecordingStart..last offset
        assert_eq!(mouse1.test_duration, 60.0);
        assert_eq!(mouse1.latency("Attack Latency"), Some(7.0));
        assert_eq!(mouse1.total_time("Total Aggression"), Some(8.0));
        assert_eq!(mouse1.behavior("Attack bites").count, 2);
        assert_eq!(mouse1.behavior("Attack bites").duration, 9.0);

        let mouse2 = &analyzer.results()[1];
        assert_eq!(mouse2.test_duration, 300.0);
        assert_eq!(mouse2.latency("Attack Latency"), Some(300.0));
        assert_eq!(mouse2.total_time("Total Aggression"), Some(30.0));
    }

    #[test]
    fn test_config_change_applies_on_reanalyze() {
        let mut analyzer = Analyzer::new();
        analyzer.load_contents(batch());
        analyzer
            .metrics_config_mut()
            .add_latency_metric(LatencyMetric::new("Dig Latency", "Digging"))
            .unwrap();
        analyzer
            .metrics_config_mut()
            .add_total_time_metric(TotalTimeMetric::new("Active", ["Digging", "Attack bites"]))
            .unwrap();

        // Stale until re-run
        assert_eq!(analyzer.results()[0].latency("Dig Latency"), None);

        analyzer.analyze();
        let mouse1 = &analyzer.results()[0];
        assert_eq!(mouse1.latency("Dig Latency"), Some(35.0));
        assert_eq!(mouse1.total_time("Active"), Some(33.0));
    }

    #[test]
    fn test_interval_results_when_enabled() {
        let mut analyzer = Analyzer::new();
        analyzer.set_interval_minutes(Some(0.5)).unwrap();
        analyzer.load_contents(batch());

        let intervals = analyzer.interval_results();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].records.len(), 2);
        assert_eq!(intervals[0].records[1].behavior("Digging").duration, 20.0);
        // Summary-only files cannot be windowed
        assert!(intervals[1].records.is_empty());
        assert_eq!(analyzer.default_export_mode(), ExportMode::Interval);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut analyzer = Analyzer::new();
        assert!(analyzer.set_interval_minutes(Some(0.0)).is_err());
        assert!(analyzer.set_interval_minutes(Some(1e-9)).is_err());
        assert!(analyzer.set_test_duration_override(Some(-5.0)).is_err());
        assert_eq!(analyzer.interval_minutes(), None);
    }

    #[test]
    fn test_oversized_interval_request_skips_windows_only() {
        let huge = "Test Duration (seconds),1e12\nEvent,Onset,Offset\nChasing,1,2\n";
        let mut analyzer = Analyzer::new();
        analyzer.set_interval_minutes(Some(1.0)).unwrap();
        let report = analyzer.load_contents(vec![
            ("huge.csv".to_string(), huge.to_string()),
            ("data/mouse1_annotations.csv".to_string(), MOUSE_ONE.to_string()),
        ]);

        assert!(report.is_success());
        assert_eq!(analyzer.results().len(), 2);
        assert_eq!(analyzer.results()[0].test_duration, 1e12);
        let ids: Vec<&str> = analyzer
            .interval_results()
            .iter()
            .map(|r| r.session_id.as_str())
            .collect();
        assert_eq!(ids, vec!["mouse1"]);
    }

    #[test]
    fn test_test_duration_override() {
        let mut analyzer = Analyzer::new();
        analyzer.set_test_duration_override(Some(120.0)).unwrap();
        analyzer.load_contents(batch());
        assert!(analyzer.results().iter().all(|r| r.test_duration == 120.0));
    }

    #[test]
    fn test_interval_export_requires_interval_mode() {
        let mut analyzer = Analyzer::new();
        analyzer.load_contents(batch());
        let mut out = Vec::new();
        assert!(matches!(
            analyzer.export_to_writer(&mut out, ExportMode::Interval),
            Err(AnalysisError::Config(_))
        ));
        assert_eq!(analyzer.default_export_mode(), ExportMode::Standard);
    }

    #[test]
    fn test_load_files_reports_missing_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("mouse1_annotations.csv");
        fs::write(&good, MOUSE_ONE).unwrap();
        let missing = dir.path().join("missing.csv");

        let mut analyzer = Analyzer::new();
        let report = analyzer.load_files(&[missing.clone(), good.clone()]);

        assert!(report.is_success());
        assert_eq!(report.outcomes[0].path, missing.display().to_string());
        assert!(matches!(report.outcomes[0].outcome, Err(AnalysisError::Io(_))));
        assert!(report.outcomes[1].outcome.is_ok());

        let out_path = dir.path().join("summary.csv");
        analyzer.export(&out_path, ExportMode::Standard).unwrap();
        let exported = fs::read_to_string(&out_path).unwrap();
        assert!(exported.lines().nth(2).unwrap().starts_with("mouse1,"));

        // A failed export leaves results untouched
        let bad_path = dir.path().join("no_such_dir").join("summary.csv");
        assert!(analyzer.export(&bad_path, ExportMode::Standard).is_err());
        assert_eq!(analyzer.results().len(), 1);
    }

    #[test]
    fn test_all_files_failing() {
        let mut analyzer = Analyzer::new();
        let report = analyzer.load_contents(vec![("x.csv".to_string(), String::new())]);
        assert!(!report.is_success());
        assert!(analyzer.results().is_empty());
    }
}
