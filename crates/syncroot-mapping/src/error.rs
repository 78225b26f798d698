//! Error types for synchronized root setup

use thiserror::Error;

/// Failures of the setup procedure that are not ordinary [`MappingErrorCode`]
/// outcomes.
///
/// [`MappingErrorCode`]: syncroot_core::domain::MappingErrorCode
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingSetupError {
    /// The caller passed a mapping the procedure cannot work with
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// The setup token was cancelled between two steps
    #[error("mapping setup cancelled")]
    Cancelled,
}

impl MappingSetupError {
    /// True for caller bugs, as opposed to runtime conditions
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, MappingSetupError::PreconditionViolation(_))
    }
}
