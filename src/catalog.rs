//! Behavior catalog
//!
//! Insertion-ordered set of behavior labels: the built-in defaults followed by
//! every label discovered in ingested files, in first-seen order.

use crate::types::RECORDING_START;
use log::{debug, warn};
use std::collections::HashSet;

/// Behaviors every analysis reports, in column order
pub const DEFAULT_BEHAVIORS: [&str; 8] = [
    "Attack bites",
    "Sideways threats",
    "Tail rattles",
    "Chasing",
    "Social contact",
    "Self-grooming",
    "Locomotion",
    "Rearing",
];

/// Header tokens that show up as labels when a section header is mis-read
const HEADER_TOKENS: [&str; 2] = ["Event", "Behavior"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorCatalog {
    labels: Vec<String>,
    index: HashSet<String>,
}

impl Default for BehaviorCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl BehaviorCatalog {
    /// Catalog holding only the built-in behaviors
    pub fn with_defaults() -> Self {
        let mut catalog = Self {
            labels: Vec::with_capacity(DEFAULT_BEHAVIORS.len()),
            index: HashSet::new(),
        };
        for label in DEFAULT_BEHAVIORS {
            catalog.push(label);
        }
        catalog
    }

    /// Add a label if it is new. Returns `true` when the catalog grew.
    pub fn observe(&mut self, label: &str) -> bool {
        if label.trim().is_empty() || label == RECORDING_START {
            return false;
        }
        if HEADER_TOKENS.contains(&label) {
            warn!("Ignoring behavior label {label:?}: looks like a mis-parsed header row");
            return false;
        }
        if self.index.contains(label) {
            return false;
        }
        debug!("Discovered behavior: {label}");
        self.push(label);
        true
    }

    /// Observe every label in order; returns how many were new
    pub fn observe_all<'a>(&mut self, labels: impl IntoIterator<Item = &'a str>) -> usize {
        labels
            .into_iter()
            .filter(|label| self.observe(label))
            .count()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains(label)
    }

    /// Current labels in catalog order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Owned copy of the current labels
    pub fn snapshot(&self) -> Vec<String> {
        self.labels.clone()
    }

    /// Labels that are not built-in defaults
    pub fn discovered(&self) -> &[String] {
        &self.labels[DEFAULT_BEHAVIORS.len()..]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Drop discovered labels, keeping only the defaults
    pub fn reset(&mut self) {
        *self = Self::with_defaults();
    }

    fn push(&mut self, label: &str) {
        self.index.insert(label.to_string());
        self.labels.push(label.to_string());
    }
}
