//! Whole-session analysis
//!
//! Computes per-behavior duration and frequency, latency metrics and
//! overlap-aware total-time metrics for one annotation set.

use crate::config::{LatencyMetric, MetricsConfig, TotalTimeMetric};
use crate::timeline::union_length;
use crate::types::{
    AnnotationSet, BehaviorTally, MetricValue, SessionResult, TallySource,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Session length assumed when nothing else determines it (5 minutes)
pub const FALLBACK_TEST_DURATION_SEC: f64 = 300.0;

/// Analyzer for whole-session metrics
pub struct SessionAnalyzer;

impl SessionAnalyzer {
    /// Analyze one annotation set.
    ///
    /// `labels` is the catalog snapshot; every label gets a tally, zero when
    /// absent. `explicit_duration` overrides the file's own duration.
    pub fn analyze(
        session_id: &str,
        source_path: &str,
        set: &AnnotationSet,
        config: &MetricsConfig,
        labels: &[String],
        explicit_duration: Option<f64>,
    ) -> SessionResult {
        let test_duration = Self::resolve_test_duration(set, explicit_duration);
        let source = Self::tally_source(set);
        let behaviors = Self::behavior_tallies(set, labels);

        let latencies = config
            .enabled_latency_metrics()
            .map(|metric| {
                let value = match source {
                    TallySource::RawEvents => Self::latency(set, metric, test_duration),
                    TallySource::Summary => Self::summary_latency(set, metric, test_duration),
                };
                debug!("{session_id}: {}: {value:.2}s", metric.name);
                MetricValue {
                    name: metric.name.clone(),
                    value,
                }
            })
            .collect();

        let total_times = config
            .enabled_total_time_metrics()
            .map(|metric| {
                let value = match source {
                    TallySource::RawEvents => Self::total_time(set, metric),
                    TallySource::Summary => Self::summary_total_time(set, metric),
                };
                debug!("{session_id}: {}: {value:.2}s", metric.name);
                MetricValue {
                    name: metric.name.clone(),
                    value,
                }
            })
            .collect();

        info!(
            "Analyzed {session_id}: test duration {test_duration:.2}s from {:?}",
            source
        );

        SessionResult {
            session_id: session_id.to_string(),
            source_path: source_path.to_string(),
            test_duration,
            source,
            behaviors,
            latencies,
            total_times,
            analyzed_at: Utc::now(),
        }
    }

    /// Session length in seconds.
    ///
    /// Priority: explicit value, then the file's metadata line, then the
    /// earliest `RecordingStart` to the last offset, then the span of all
    /// behavior events, then [`FALLBACK_TEST_DURATION_SEC`].
    pub fn resolve_test_duration(set: &AnnotationSet, explicit_duration: Option<f64>) -> f64 {
        let usable = |d: &f64| d.is_finite() && *d > 0.0;
        if let Some(duration) = explicit_duration
            .filter(usable)
            .or_else(|| set.metadata_duration().filter(usable))
        {
            return duration;
        }

        let last_offset = set
            .behavior_events()
            .map(|e| e.offset)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        let first_onset = set
            .behavior_events()
            .map(|e| e.onset)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));
        let recording_start = set
            .recording_starts()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));

        if let (Some(start), Some(last)) = (recording_start, last_offset) {
            if start < last {
                debug!("Test duration from RecordingStart to last offset: {}s", last - start);
                return last - start;
            }
        }

        if let (Some(first), Some(last)) = (first_onset, last_offset) {
            if last > first {
                debug!("Test duration from first onset to last offset: {}s", last - first);
                return last - first;
            }
        }

        debug!("Could not determine test duration from data, using default: {FALLBACK_TEST_DURATION_SEC} seconds");
        FALLBACK_TEST_DURATION_SEC
    }

    /// Raw events win over a precomputed summary when both are present
    pub fn tally_source(set: &AnnotationSet) -> TallySource {
        if set.behavior_events().next().is_none() && set.summary().is_some() {
            TallySource::Summary
        } else {
            TallySource::RawEvents
        }
    }

    /// Duration and count per behavior, covering every catalog label
    pub fn behavior_tallies(set: &AnnotationSet, labels: &[String]) -> BTreeMap<String, BehaviorTally> {
        let mut tallies: BTreeMap<String, BehaviorTally> = labels
            .iter()
            .map(|label| (label.clone(), BehaviorTally::default()))
            .collect();

        match Self::tally_source(set) {
            TallySource::RawEvents => {
                for event in set.behavior_events() {
                    if let Some(label) = event.behavior_label() {
                        let tally = tallies.entry(label.to_string()).or_default();
                        tally.duration += event.duration();
                        tally.count += 1;
                    }
                }
            }
            TallySource::Summary => {
                for entry in set.summary().unwrap_or_default() {
                    tallies.insert(
                        entry.label.clone(),
                        BehaviorTally {
                            duration: entry.duration,
                            count: entry.frequency,
                        },
                    );
                }
            }
        }

        tallies
    }

    /// Time from the session origin to the first onset of the target behavior.
    ///
    /// The origin is the latest `RecordingStart` at or before that onset, else
    /// the earliest `RecordingStart`, else the earliest onset of any event.
    /// Returns `test_duration` when the behavior never occurs.
    pub fn latency(set: &AnnotationSet, metric: &LatencyMetric, test_duration: f64) -> f64 {
        let target = metric.target_behavior.as_str();
        let first_onset = set
            .behavior_events()
            .filter(|e| e.is_behavior(target))
            .map(|e| e.onset)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));

        let Some(first_onset) = first_onset else {
            debug!("No {target} found, using test duration: {test_duration}s");
            return test_duration;
        };

        let latest_start_before = set
            .recording_starts()
            .filter(|start| *start <= first_onset)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        let earliest_start = set
            .recording_starts()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));
        let earliest_onset = set
            .events()
            .iter()
            .map(|e| e.onset)
            .fold(first_onset, f64::min);

        let origin = match (latest_start_before, earliest_start) {
            (Some(start), _) => start,
            (None, Some(start)) => {
                warn!("No RecordingStart before first {target}; using earliest at {start}s");
                start
            }
            (None, None) => earliest_onset,
        };

        let latency = first_onset - origin;
        if latency < 0.0 {
            warn!(
                "Calculated negative {target} latency ({latency}s); this suggests data ordering issues"
            );
            return 0.0;
        }
        if latency > test_duration {
            warn!(
                "First {target} at {latency}s is past the session end ({test_duration}s); capping"
            );
            return test_duration;
        }
        latency
    }

    /// Union duration of all events whose behavior is in the metric's set
    pub fn total_time(set: &AnnotationSet, metric: &TotalTimeMetric) -> f64 {
        union_length(
            set.behavior_events()
                .filter(|e| e.behavior_label().is_some_and(|label| metric.includes(label)))
                .map(|e| (e.onset, e.offset)),
        )
    }

    /// Without raw events only occurrence is known: 0 if seen, else the session length
    fn summary_latency(set: &AnnotationSet, metric: &LatencyMetric, test_duration: f64) -> f64 {
        let occurred = set
            .summary()
            .unwrap_or_default()
            .iter()
            .any(|entry| entry.label == metric.target_behavior && entry.frequency > 0);
        if occurred {
            0.0
        } else {
            test_duration
        }
    }

    /// Without raw events overlaps are unknown, so summary durations are summed
    fn summary_total_time(set: &AnnotationSet, metric: &TotalTimeMetric) -> f64 {
        set.summary()
            .unwrap_or_default()
            .iter()
            .filter(|entry| metric.includes(&entry.label))
            .map(|entry| entry.duration)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BehaviorCatalog;
    use crate::types::{Event, SummaryEntry};
    use proptest::prelude::*;

    fn attack_latency() -> LatencyMetric {
        LatencyMetric::new("Attack Latency", "Attack bites")
    }

    fn events(events: Vec<Event>) -> AnnotationSet {
        AnnotationSet::new(events, None, None)
    }

    #[test]
    fn test_overlapping_attack_bites() {
        let set = events(vec![
            Event::behavior("Attack bites", 10.0, 15.0),
            Event::behavior("Attack bites", 12.0, 20.0),
        ]);
        let config = MetricsConfig::default();
        let catalog = BehaviorCatalog::default();
        let result = SessionAnalyzer::analyze("m1", "m1.csv", &set, &config, catalog.labels(), None);

        assert_eq!(result.total_time("Total Aggression"), Some(10.0));
        assert_eq!(result.behavior("Attack bites").count, 2);
        assert_eq!(result.behavior("Attack bites").duration, 13.0);
        assert_eq!(result.behavior("Rearing"), BehaviorTally::default());
        assert_eq!(result.source, TallySource::RawEvents);
    }

    #[test]
    fn test_latency_from_recording_start() {
        let set = events(vec![
            Event::recording_start(5.0),
            Event::behavior("Attack bites", 12.0, 14.0),
            Event::behavior("Attack bites", 30.0, 31.0),
        ]);
        let config = MetricsConfig::default();
        let result = SessionAnalyzer::analyze("m1", "m1.csv", &set, &config, &[], None);
        assert_eq!(result.latency("Attack Latency"), Some(7.0));
        assert_eq!(result.test_duration, 26.0);
    }

    #[test]
    fn test_latency_uses_latest_start_at_or_before_target() {
        let set = events(vec![
            Event::recording_start(2.0),
            Event::recording_start(10.0),
            Event::recording_start(50.0),
            Event::behavior("Attack bites", 25.0, 26.0),
        ]);
        assert_eq!(SessionAnalyzer::latency(&set, &attack_latency(), 300.0), 15.0);

        let coincident = events(vec![
            Event::recording_start(25.0),
            Event::behavior("Attack bites", 25.0, 26.0),
        ]);
        assert_eq!(SessionAnalyzer::latency(&coincident, &attack_latency(), 300.0), 0.0);
    }

    #[test]
    fn test_latency_start_after_target_clamps_to_zero() {
        let set = events(vec![
            Event::recording_start(40.0),
            Event::behavior("Attack bites", 25.0, 26.0),
        ]);
        assert_eq!(SessionAnalyzer::latency(&set, &attack_latency(), 300.0), 0.0);
    }

    #[test]
    fn test_latency_without_recording_start_uses_earliest_onset() {
        let set = events(vec![
            Event::behavior("Chasing", 3.0, 4.0),
            Event::behavior("Attack bites", 9.0, 10.0),
        ]);
        assert_eq!(SessionAnalyzer::latency(&set, &attack_latency(), 300.0), 6.0);
    }

    #[test]
    fn test_latency_absent_behavior_is_test_duration() {
        let set = events(vec![Event::behavior("Chasing", 3.0, 4.0)]);
        assert_eq!(SessionAnalyzer::latency(&set, &attack_latency(), 123.5), 123.5);
    }

    #[test]
    fn test_resolve_test_duration_priority() {
        let with_metadata = AnnotationSet::new(
            vec![Event::recording_start(0.0), Event::behavior("Chasing", 1.0, 50.0)],
            None,
            Some(600.0),
        );
        assert_eq!(SessionAnalyzer::resolve_test_duration(&with_metadata, None), 600.0);
        assert_eq!(SessionAnalyzer::resolve_test_duration(&with_metadata, Some(90.0)), 90.0);
        // An unusable explicit value falls back to the metadata line
        assert_eq!(SessionAnalyzer::resolve_test_duration(&with_metadata, Some(0.0)), 600.0);
        assert_eq!(SessionAnalyzer::resolve_test_duration(&with_metadata, Some(f64::NAN)), 600.0);

        let with_start = events(vec![
            Event::recording_start(10.0),
            Event::behavior("Chasing", 20.0, 70.0),
        ]);
        assert_eq!(SessionAnalyzer::resolve_test_duration(&with_start, None), 60.0);

        let start_after_data = events(vec![
            Event::behavior("Chasing", 20.0, 70.0),
            Event::recording_start(100.0),
        ]);
        assert_eq!(SessionAnalyzer::resolve_test_duration(&start_after_data, None), 50.0);

        assert_eq!(
            SessionAnalyzer::resolve_test_duration(&AnnotationSet::default(), None),
            FALLBACK_TEST_DURATION_SEC
        );
    }

    #[test]
    fn test_summary_only_passthrough() {
        let set = AnnotationSet::new(
            Vec::new(),
            Some(vec![
                SummaryEntry {
                    label: "Attack bites".to_string(),
                    duration: 12.25,
                    frequency: 3,
                },
                SummaryEntry {
                    label: "Chasing".to_string(),
                    duration: 4.0,
                    frequency: 1,
                },
            ]),
            Some(300.0),
        );
        let config = MetricsConfig::default();
        let result = SessionAnalyzer::analyze("m2", "m2.csv", &set, &config, &[], None);

        assert_eq!(result.source, TallySource::Summary);
        assert_eq!(
            result.behavior("Attack bites"),
            BehaviorTally {
                duration: 12.25,
                count: 3
            }
        );
        assert_eq!(result.latency("Attack Latency"), Some(0.0));
        assert_eq!(result.total_time("Total Aggression"), Some(16.25));
    }

    #[test]
    fn test_raw_events_win_over_summary() {
        let set = AnnotationSet::new(
            vec![Event::behavior("Chasing", 0.0, 2.0)],
            Some(vec![SummaryEntry {
                label: "Chasing".to_string(),
                duration: 99.0,
                frequency: 9,
            }]),
            None,
        );
        let tallies = SessionAnalyzer::behavior_tallies(&set, &[]);
        assert_eq!(tallies["Chasing"], BehaviorTally { duration: 2.0, count: 1 });
    }

    #[test]
    fn test_disabled_metrics_are_skipped() {
        let mut config = MetricsConfig::default();
        config
            .update_latency_metric("Attack Latency", attack_latency().disabled())
            .unwrap();
        let result = SessionAnalyzer::analyze("m", "m.csv", &AnnotationSet::default(), &config, &[], None);
        assert!(result.latencies.is_empty());
        assert_eq!(result.total_times.len(), 2);
        assert_eq!(result.total_time("Total Aggression"), Some(0.0));
    }

    proptest! {
        #[test]
        fn prop_latency_within_session(
            starts in prop::collection::vec(0.0f64..200.0, 0..3),
            bites in prop::collection::vec((0.0f64..250.0, 0.0f64..20.0), 0..5),
            others in prop::collection::vec((0.0f64..250.0, 0.0f64..20.0), 0..5),
            explicit in prop::option::of(1.0f64..400.0),
        ) {
            let mut all: Vec<Event> = starts.iter().map(|s| Event::recording_start(*s)).collect();
            all.extend(bites.iter().map(|(s, l)| Event::behavior("Attack bites", *s, s + l)));
            all.extend(others.iter().map(|(s, l)| Event::behavior("Chasing", *s, s + l)));
            let set = AnnotationSet::new(all, None, None);

            let duration = SessionAnalyzer::resolve_test_duration(&set, explicit);
            let latency = SessionAnalyzer::latency(&set, &attack_latency(), duration);
            prop_assert!(latency >= 0.0);
            prop_assert!(latency <= duration);
            if bites.is_empty() {
                prop_assert_eq!(latency, duration);
            }
        }
    }
}
