//! Error types for Ethostat

use crate::types::RowIssue;
use thiserror::Error;

/// Errors that can occur while loading, analyzing or exporting annotations
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to parse annotation file: {0}")]
    Parse(String),

    #[error("Invalid row at line {line} ({row:?}): {reason}")]
    Validation {
        line: usize,
        row: String,
        reason: String,
    },

    #[error("Metrics configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AnalysisError {
    pub(crate) fn validation(line: usize, row: &str, reason: impl Into<String>) -> Self {
        AnalysisError::Validation {
            line,
            row: row.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable code, used by the CLI error report
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Parse(_) => "PARSE_ERROR",
            AnalysisError::Validation { .. } => "VALIDATION_ERROR",
            AnalysisError::Config(_) => "CONFIG_ERROR",
            AnalysisError::Io(_) => "IO_ERROR",
            AnalysisError::Json(_) => "JSON_ERROR",
            AnalysisError::Csv(_) => "CSV_ERROR",
        }
    }
}

impl From<&RowIssue> for AnalysisError {
    fn from(issue: &RowIssue) -> Self {
        AnalysisError::validation(issue.line, &issue.row, issue.reason.clone())
    }
}
