use super::types::{Stage, Status};

/// Errors returned by production operations. Stage failures are not part of
/// this type: they are persisted on the production as `status = error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// The event is not legal from the current state. Nothing was written.
    #[error("invalid transition: {event} is not accepted at {stage}/{status}")]
    InvalidTransition {
        stage: Stage,
        status: Status,
        event: String,
    },

    /// Human input rejected before any generation call.
    #[error("validation error: {0}")]
    Validation(String),

    /// The production changed between load and save. Reload and re-issue.
    #[error("concurrency conflict on production {production_id}: expected version {expected_version}")]
    ConcurrencyConflict {
        production_id: String,
        expected_version: i64,
    },

    #[error("production not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl FlowError {
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::InvalidTransition { .. } => "invalid_transition",
            FlowError::Validation(_) => "validation_error",
            FlowError::ConcurrencyConflict { .. } => "concurrency_conflict",
            FlowError::NotFound(_) => "not_found",
            FlowError::Storage(_) => "internal",
        }
    }
}

impl From<rusqlite::Error> for FlowError {
    fn from(e: rusqlite::Error) -> Self {
        FlowError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::Storage(format!("serialization: {}", e))
    }
}
