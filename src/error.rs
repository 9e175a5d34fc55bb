//! Error taxonomy shared by every component of the engine.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed model, matrix or request input. Never silently corrected.
    #[error("Validation error: {0}")]
    Validation(String),

    /// `ConstraintSet::validate()` reported issues; the solve is blocked.
    #[error("Constraint set {set_id} is invalid: {}", .issues.join("; "))]
    InvalidConstraintSet { set_id: String, issues: Vec<String> },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A lifecycle transition was attempted on a candidate that is no longer a draft.
    #[error("Cannot {attempted} {id}: candidate is already {current}")]
    InvalidState {
        id: String,
        current: String,
        attempted: &'static str,
    },

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }
}
