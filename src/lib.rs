//! Ethostat - batch analysis of behavioral-event annotations
//!
//! Ethostat turns annotation files recorded against videos into summary
//! statistics through a deterministic pipeline: annotation loading → behavior
//! catalog update → session metrics → optional interval breakdown → CSV export.
//!
//! ## Metrics
//!
//! - **Duration / frequency** per behavior
//! - **Latency**: time from the session origin to the first occurrence of a behavior
//! - **Total time**: overlap-aware union duration of a set of behaviors
//! - **Intervals**: the above (minus latency) inside fixed-width windows

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod interval;
pub mod loader;
pub mod pipeline;
pub mod session;
pub mod timeline;
pub mod types;

pub use catalog::{BehaviorCatalog, DEFAULT_BEHAVIORS};
pub use config::{LatencyMetric, MetricsConfig, TotalTimeMetric};
pub use error::AnalysisError;
pub use export::ExportMode;
pub use loader::AnnotationLoader;
pub use pipeline::{Analyzer, FileOutcome, LoadReport};
pub use types::{AnnotationSet, Event, EventKind, IntervalResult, SessionResult};

/// Ethostat version
pub const ETHOSTAT_VERSION: &str = env!("CARGO_PKG_VERSION");
