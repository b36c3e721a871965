//! Interval analysis
//!
//! Splits a session into consecutive fixed-width windows starting at 0 and
//! recomputes per-behavior duration/frequency and total-time metrics inside
//! each window. Latency metrics are session-level only.

use crate::config::MetricsConfig;
use crate::error::AnalysisError;
use crate::session::SessionAnalyzer;
use crate::timeline::{clip, union_length};
use crate::types::{
    AnnotationSet, BehaviorTally, IntervalRecord, IntervalResult, MetricValue, TallySource,
};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Narrowest accepted window, in seconds
pub const MIN_WINDOW_SECS: f64 = 1.0;

/// Most windows one session may be split into
pub const MAX_WINDOWS: usize = 100_000;

/// Analyzer for windowed breakdowns
pub struct IntervalAnalyzer;

impl IntervalAnalyzer {
    /// Convert a window width in minutes to seconds, rejecting widths under one second
    pub fn window_secs(window_minutes: f64) -> Result<f64, AnalysisError> {
        if !window_minutes.is_finite() || window_minutes * 60.0 < MIN_WINDOW_SECS {
            return Err(AnalysisError::Config(format!(
                "interval width must be at least {MIN_WINDOW_SECS} second, got {window_minutes} minutes"
            )));
        }
        Ok(window_minutes * 60.0)
    }

    /// `[start, end)` bounds of every window covering `[0, test_duration)`
    pub fn window_bounds(
        test_duration: f64,
        window_secs: f64,
    ) -> Result<Vec<(f64, f64)>, AnalysisError> {
        if !test_duration.is_finite() || test_duration <= 0.0 || window_secs <= 0.0 {
            return Ok(Vec::new());
        }
        let count = (test_duration / window_secs).ceil();
        if count > MAX_WINDOWS as f64 {
            return Err(AnalysisError::Config(format!(
                "{test_duration}s session split into {window_secs}s windows needs {count} windows, more than {MAX_WINDOWS}"
            )));
        }
        Ok((0..count as usize)
            .map(|k| {
                let start = k as f64 * window_secs;
                let end = ((k + 1) as f64 * window_secs).min(test_duration);
                (start, end)
            })
            .collect())
    }

    /// Break one annotation set into windows of `window_minutes`
    pub fn analyze(
        session_id: &str,
        source_path: &str,
        set: &AnnotationSet,
        config: &MetricsConfig,
        labels: &[String],
        test_duration: f64,
        window_minutes: f64,
    ) -> Result<IntervalResult, AnalysisError> {
        let window_secs = Self::window_secs(window_minutes)?;

        if SessionAnalyzer::tally_source(set) == TallySource::Summary {
            warn!("Interval analysis requested but no raw event data available for {source_path}");
            return Ok(IntervalResult {
                session_id: session_id.to_string(),
                source_path: source_path.to_string(),
                window_secs,
                records: Vec::new(),
            });
        }

        let mut all_labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        for label in set.labels() {
            if !all_labels.contains(&label) {
                all_labels.push(label);
            }
        }

        let bounds = Self::window_bounds(test_duration, window_secs)?;
        debug!(
            "{session_id}: {} intervals of {window_secs}s over {test_duration}s",
            bounds.len()
        );

        let records = bounds
            .into_iter()
            .enumerate()
            .map(|(k, (start, end))| Self::window_record(set, config, &all_labels, k + 1, start, end))
            .collect::<Vec<_>>();

        info!(
            "Completed interval analysis for {session_id} with {} intervals",
            records.len()
        );

        Ok(IntervalResult {
            session_id: session_id.to_string(),
            source_path: source_path.to_string(),
            window_secs,
            records,
        })
    }

    fn window_record(
        set: &AnnotationSet,
        config: &MetricsConfig,
        labels: &[&str],
        interval_number: usize,
        start: f64,
        end: f64,
    ) -> IntervalRecord {
        let mut behaviors: BTreeMap<String, BehaviorTally> = labels
            .iter()
            .map(|label| (label.to_string(), BehaviorTally::default()))
            .collect();

        // Window-clipped copy of every behavior event that touches the window
        let clipped: Vec<(&str, f64, f64)> = set
            .behavior_events()
            .filter_map(|e| {
                let label = e.behavior_label()?;
                let (onset, offset) = clip(e.onset, e.offset, start, end)?;
                Some((label, onset, offset))
            })
            .collect();

        for (label, onset, offset) in &clipped {
            let tally = behaviors.entry(label.to_string()).or_default();
            tally.duration += offset - onset;
            tally.count += 1;
        }

        let total_times = config
            .enabled_total_time_metrics()
            .map(|metric| MetricValue {
                name: metric.name.clone(),
                value: union_length(
                    clipped
                        .iter()
                        .filter(|(label, _, _)| metric.includes(label))
                        .map(|(_, onset, offset)| (*onset, *offset)),
                ),
            })
            .collect();

        IntervalRecord {
            interval_number,
            start_time: start,
            end_time: end,
            behaviors,
            total_times,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Event, SummaryEntry};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn analyze(set: &AnnotationSet, test_duration: f64, minutes: f64) -> IntervalResult {
        IntervalAnalyzer::analyze(
            "m1",
            "m1.csv",
            set,
            &MetricsConfig::default(),
            &[],
            test_duration,
            minutes,
        )
        .unwrap()
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(
            IntervalAnalyzer::window_bounds(650.0, 300.0).unwrap(),
            vec![(0.0, 300.0), (300.0, 600.0), (600.0, 650.0)]
        );
        assert_eq!(
            IntervalAnalyzer::window_bounds(300.0, 300.0).unwrap(),
            vec![(0.0, 300.0)]
        );
        assert!(IntervalAnalyzer::window_bounds(0.0, 60.0).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_positive_width() {
        assert!(IntervalAnalyzer::window_secs(0.0).is_err());
        assert!(IntervalAnalyzer::window_secs(-1.0).is_err());
        assert!(IntervalAnalyzer::window_secs(f64::NAN).is_err());
        assert_eq!(IntervalAnalyzer::window_secs(2.5).unwrap(), 150.0);
    }

    #[test]
    fn test_rejects_sub_second_width() {
        assert!(matches!(
            IntervalAnalyzer::window_secs(1e-9),
            Err(AnalysisError::Config(_))
        ));
        assert!(IntervalAnalyzer::window_secs(0.5 / 60.0).is_err());
        assert_eq!(IntervalAnalyzer::window_secs(0.05).unwrap().round(), 3.0);
    }

    #[test]
    fn test_too_many_windows_is_config_error() {
        assert!(matches!(
            IntervalAnalyzer::window_bounds(300.0, 6e-8),
            Err(AnalysisError::Config(_))
        ));
        assert!(matches!(
            IntervalAnalyzer::window_bounds(1e12, 60.0),
            Err(AnalysisError::Config(_))
        ));
        assert_eq!(
            IntervalAnalyzer::window_bounds(MAX_WINDOWS as f64, 1.0).unwrap().len(),
            MAX_WINDOWS
        );

        let set = AnnotationSet::new(vec![Event::behavior("Chasing", 0.0, 10.0)], None, None);
        let result = IntervalAnalyzer::analyze(
            "m1",
            "m1.csv",
            &set,
            &MetricsConfig::default(),
            &[],
            1e12,
            1.0,
        );
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_single_event_single_window() {
        let set = AnnotationSet::new(vec![Event::behavior("Chasing", 0.0, 300.0)], None, None);
        let result = analyze(&set, 300.0, 5.0);

        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!((record.start_time, record.end_time), (0.0, 300.0));
        assert_eq!(record.interval_number, 1);
        assert_eq!(record.behavior("Chasing"), BehaviorTally { duration: 300.0, count: 1 });
        assert_eq!(record.time_label(), "0.0-5.0");
    }

    #[test]
    fn test_event_spanning_windows_counts_in_each() {
        let set = AnnotationSet::new(
            vec![
                Event::behavior("Attack bites", 50.0, 70.0),
                Event::behavior("Chasing", 55.0, 65.0),
                Event::behavior("Chasing", 120.0, 121.0),
            ],
            None,
            None,
        );
        let result = analyze(&set, 180.0, 1.0);
        assert_eq!(result.records.len(), 3);

        let first = &result.records[0];
        assert_eq!(first.behavior("Attack bites"), BehaviorTally { duration: 10.0, count: 1 });
        assert_eq!(first.behavior("Chasing"), BehaviorTally { duration: 5.0, count: 1 });
        assert_eq!(first.total_time("Total Aggression"), Some(10.0));

        let second = &result.records[1];
        assert_eq!(second.behavior("Attack bites"), BehaviorTally { duration: 10.0, count: 1 });
        assert_eq!(second.total_time("Total Aggression"), Some(10.0));

        let third = &result.records[2];
        assert_eq!(third.behavior("Attack bites"), BehaviorTally::default());
        assert_eq!(third.behavior("Chasing"), BehaviorTally { duration: 1.0, count: 1 });
        assert_eq!(third.total_time("Total Aggression"), Some(1.0));
    }

    #[test]
    fn test_event_ending_on_boundary_not_counted_in_next() {
        let set = AnnotationSet::new(vec![Event::behavior("Rearing", 30.0, 60.0)], None, None);
        let result = analyze(&set, 120.0, 1.0);
        assert_eq!(result.records[0].behavior("Rearing").count, 1);
        assert_eq!(result.records[1].behavior("Rearing").count, 0);
    }

    #[test]
    fn test_summary_only_has_no_windows() {
        let set = AnnotationSet::new(
            Vec::new(),
            Some(vec![SummaryEntry {
                label: "Rearing".to_string(),
                duration: 10.0,
                frequency: 2,
            }]),
            None,
        );
        assert!(analyze(&set, 300.0, 1.0).records.is_empty());
    }

    proptest! {
        #[test]
        fn prop_window_durations_sum_to_session(
            raw in prop::collection::vec((0.0f64..590.0, 0.0f64..100.0), 1..10),
            minutes in 0.5f64..4.0,
        ) {
            let events: Vec<Event> = raw
                .iter()
                .map(|(s, l)| Event::behavior("Chasing", *s, (s + l).min(600.0)))
                .collect();
            let set = AnnotationSet::new(events, None, None);
            let session = SessionAnalyzer::behavior_tallies(&set, &[]);
            let result = analyze(&set, 600.0, minutes);

            let windowed: f64 = result.records.iter().map(|r| r.behavior("Chasing").duration).sum();
            prop_assert!((windowed - session["Chasing"].duration).abs() < 1e-6);
        }
    }
}
