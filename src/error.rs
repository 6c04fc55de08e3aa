//! Error types for EPM Lens

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading inputs or encoding reports
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid reference model: {0}")]
    InvalidModel(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Event log contains no cases")]
    EmptyLog,
}

/// Reasons a single case cannot be analyzed.
///
/// These never abort a run; the case is skipped and reported as a [`CaseFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseError {
    #[error("event {index} belongs to case '{found}', not '{expected}'")]
    ForeignEvent {
        index: usize,
        expected: String,
        found: String,
    },
}

/// A case that was skipped, with the reason it could not be analyzed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFailure {
    pub case_id: String,
    pub reason: String,
}

impl CaseFailure {
    pub fn new(case_id: impl Into<String>, error: &CaseError) -> Self {
        Self {
            case_id: case_id.into(),
            reason: error.to_string(),
        }
    }
}
