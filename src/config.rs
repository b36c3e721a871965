//! Metrics configuration store
//!
//! User-editable definitions of latency metrics and total-time metrics,
//! persisted as a JSON document. Every mutating operation validates first and
//! leaves the store untouched on failure.

use crate::error::AnalysisError;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Name of the built-in latency metric
pub const DEFAULT_LATENCY_METRIC: &str = "Attack Latency";

/// Names of the built-in total-time metrics; at least one must remain
pub const DEFAULT_TOTAL_TIME_METRICS: [&str; 2] =
    ["Total Aggression", "Total Aggression(without tail-rattles)"];

fn enabled_by_default() -> bool {
    true
}

/// Time from the session origin to the first occurrence of a behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyMetric {
    pub name: String,
    #[serde(rename = "behavior")]
    pub target_behavior: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl LatencyMetric {
    pub fn new(name: impl Into<String>, target_behavior: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_behavior: target_behavior.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Overlap-aware union duration of a set of behaviors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalTimeMetric {
    pub name: String,
    pub behaviors: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl TotalTimeMetric {
    /// Build a metric; repeated behaviors are kept once, in first-seen order
    pub fn new<I, S>(name: impl Into<String>, behaviors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for behavior in behaviors.into_iter().map(Into::into) {
            if !unique.contains(&behavior) {
                unique.push(behavior);
            }
        }
        Self {
            name: name.into(),
            behaviors: unique,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn includes(&self, behavior: &str) -> bool {
        self.behaviors.iter().any(|b| b == behavior)
    }
}

fn default_latency_metrics() -> Vec<LatencyMetric> {
    vec![LatencyMetric::new(DEFAULT_LATENCY_METRIC, "Attack bites")]
}

fn default_total_time_metrics() -> Vec<TotalTimeMetric> {
    vec![
        TotalTimeMetric::new(
            DEFAULT_TOTAL_TIME_METRICS[0],
            ["Attack bites", "Sideways threats", "Tail rattles", "Chasing"],
        ),
        TotalTimeMetric::new(
            DEFAULT_TOTAL_TIME_METRICS[1],
            ["Attack bites", "Sideways threats", "Chasing"],
        ),
    ]
}

fn is_default_total_time(name: &str) -> bool {
    DEFAULT_TOTAL_TIME_METRICS.contains(&name)
}

fn check_name(kind: &str, name: &str) -> Result<(), AnalysisError> {
    if name.trim().is_empty() {
        return Err(AnalysisError::Config(format!("{kind} metric name must not be empty")));
    }
    Ok(())
}

/// Latency and total-time metric definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_latency_metrics")]
    latency_metrics: Vec<LatencyMetric>,
    #[serde(default = "default_total_time_metrics")]
    total_time_metrics: Vec<TotalTimeMetric>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            latency_metrics: default_latency_metrics(),
            total_time_metrics: default_total_time_metrics(),
        }
    }
}

impl MetricsConfig {
    /// Build a configuration from explicit collections, validating names
    pub fn from_parts(
        latency_metrics: Vec<LatencyMetric>,
        total_time_metrics: Vec<TotalTimeMetric>,
    ) -> Result<Self, AnalysisError> {
        let mut config = Self {
            latency_metrics,
            total_time_metrics,
        };
        config.dedupe_behaviors();
        config.validate()?;
        Ok(config)
    }

    pub fn latency_metrics(&self) -> &[LatencyMetric] {
        &self.latency_metrics
    }

    pub fn total_time_metrics(&self) -> &[TotalTimeMetric] {
        &self.total_time_metrics
    }

    pub fn enabled_latency_metrics(&self) -> impl Iterator<Item = &LatencyMetric> {
        self.latency_metrics.iter().filter(|m| m.enabled)
    }

    pub fn enabled_total_time_metrics(&self) -> impl Iterator<Item = &TotalTimeMetric> {
        self.total_time_metrics.iter().filter(|m| m.enabled)
    }

    pub fn add_latency_metric(&mut self, metric: LatencyMetric) -> Result<(), AnalysisError> {
        check_name("Latency", &metric.name)?;
        if self.latency_metrics.iter().any(|m| m.name == metric.name) {
            return Err(AnalysisError::Config(format!(
                "Latency metric '{}' already exists",
                metric.name
            )));
        }
        info!(
            "Added latency metric: {} for behavior '{}'",
            metric.name, metric.target_behavior
        );
        self.latency_metrics.push(metric);
        Ok(())
    }

    pub fn add_total_time_metric(&mut self, metric: TotalTimeMetric) -> Result<(), AnalysisError> {
        check_name("Total time", &metric.name)?;
        if self.total_time_metrics.iter().any(|m| m.name == metric.name) {
            return Err(AnalysisError::Config(format!(
                "Total time metric '{}' already exists",
                metric.name
            )));
        }
        info!(
            "Added total time metric: {} for behaviors {:?}",
            metric.name, metric.behaviors
        );
        self.total_time_metrics.push(metric);
        Ok(())
    }

    /// Replace the latency metric named `old_name`, keeping its position
    pub fn update_latency_metric(
        &mut self,
        old_name: &str,
        metric: LatencyMetric,
    ) -> Result<(), AnalysisError> {
        check_name("Latency", &metric.name)?;
        let position = self
            .latency_metrics
            .iter()
            .position(|m| m.name == old_name)
            .ok_or_else(|| {
                AnalysisError::Config(format!("Latency metric '{old_name}' not found"))
            })?;
        let conflict = self
            .latency_metrics
            .iter()
            .enumerate()
            .any(|(i, m)| i != position && m.name == metric.name);
        if conflict {
            return Err(AnalysisError::Config(format!(
                "Cannot update latency metric: name '{}' already exists",
                metric.name
            )));
        }
        info!("Updated latency metric: {} -> {}", old_name, metric.name);
        self.latency_metrics[position] = metric;
        Ok(())
    }

    /// Replace the total-time metric named `old_name`, keeping its position
    pub fn update_total_time_metric(
        &mut self,
        old_name: &str,
        metric: TotalTimeMetric,
    ) -> Result<(), AnalysisError> {
        check_name("Total time", &metric.name)?;
        let position = self
            .total_time_metrics
            .iter()
            .position(|m| m.name == old_name)
            .ok_or_else(|| {
                AnalysisError::Config(format!("Total time metric '{old_name}' not found"))
            })?;
        let conflict = self
            .total_time_metrics
            .iter()
            .enumerate()
            .any(|(i, m)| i != position && m.name == metric.name);
        if conflict {
            return Err(AnalysisError::Config(format!(
                "Cannot update total time metric: name '{}' already exists",
                metric.name
            )));
        }
        // Renaming away a built-in counts as removing it
        if is_default_total_time(old_name)
            && !is_default_total_time(&metric.name)
            && self.remaining_defaults_without(position) == 0
        {
            return Err(AnalysisError::Config(format!(
                "Cannot rename default metric '{old_name}' - at least one default must remain"
            )));
        }
        info!("Updated total time metric: {} -> {}", old_name, metric.name);
        self.total_time_metrics[position] = metric;
        Ok(())
    }

    pub fn remove_latency_metric(&mut self, name: &str) -> Result<LatencyMetric, AnalysisError> {
        if name == DEFAULT_LATENCY_METRIC && self.latency_metrics.len() == 1 {
            return Err(AnalysisError::Config(format!(
                "Cannot remove default {DEFAULT_LATENCY_METRIC} metric"
            )));
        }
        let position = self
            .latency_metrics
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| AnalysisError::Config(format!("Latency metric '{name}' not found")))?;
        info!("Removed latency metric: {name}");
        Ok(self.latency_metrics.remove(position))
    }

    pub fn remove_total_time_metric(
        &mut self,
        name: &str,
    ) -> Result<TotalTimeMetric, AnalysisError> {
        let position = self
            .total_time_metrics
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| {
                AnalysisError::Config(format!("Total time metric '{name}' not found"))
            })?;
        if is_default_total_time(name) && self.remaining_defaults_without(position) == 0 {
            return Err(AnalysisError::Config(format!(
                "Cannot remove default metric '{name}' - at least one default must remain"
            )));
        }
        info!("Removed total time metric: {name}");
        Ok(self.total_time_metrics.remove(position))
    }

    /// Restore the built-in definitions
    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
        info!("Reset metrics configuration to defaults");
    }

    pub fn to_json(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a configuration document. Collections missing from the
    /// document fall back to the built-in defaults.
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.dedupe_behaviors();
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration document from `path`
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let json = fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        info!("Loaded metrics configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), AnalysisError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        info!("Saved metrics configuration to {}", path.display());
        Ok(())
    }

    fn remaining_defaults_without(&self, position: usize) -> usize {
        self.total_time_metrics
            .iter()
            .enumerate()
            .filter(|(i, m)| *i != position && is_default_total_time(&m.name))
            .count()
    }

    /// Keep each behavior once per total-time metric, in first-seen order
    fn dedupe_behaviors(&mut self) {
        for metric in &mut self.total_time_metrics {
            let mut unique: Vec<String> = Vec::with_capacity(metric.behaviors.len());
            for behavior in metric.behaviors.drain(..) {
                if !unique.contains(&behavior) {
                    unique.push(behavior);
                }
            }
            metric.behaviors = unique;
        }
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        for (i, metric) in self.latency_metrics.iter().enumerate() {
            check_name("Latency", &metric.name)?;
            if self.latency_metrics[..i].iter().any(|m| m.name == metric.name) {
                return Err(AnalysisError::Config(format!(
                    "Duplicate latency metric name '{}'",
                    metric.name
                )));
            }
        }
        for (i, metric) in self.total_time_metrics.iter().enumerate() {
            check_name("Total time", &metric.name)?;
            if self.total_time_metrics[..i].iter().any(|m| m.name == metric.name) {
                return Err(AnalysisError::Config(format!(
                    "Duplicate total time metric name '{}'",
                    metric.name
                )));
            }
        }
        if !self
            .total_time_metrics
            .iter()
            .any(|m| is_default_total_time(&m.name))
        {
            return Err(AnalysisError::Config(format!(
                "At least one default total time metric must remain ({})",
                DEFAULT_TOTAL_TIME_METRICS.join(", ")
            )));
        }
        Ok(())
    }
}
