//! Change-extraction errors.
//! Aggregates subsystem errors via `From` conversions.

use super::error_code::{self, CrrErrorCode};
use super::{SchemaError, SqlError};

/// Errors surfaced by a change-extraction scan.
///
/// Preparation, execution, and resource exhaustion are distinct variants so
/// callers can tell retryable conditions from structural ones.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("sql synthesis error: {0}")]
    Sql(#[from] SqlError),

    #[error("statement preparation failed: {message}")]
    Prepare { message: String },

    #[error("query execution failed: {message}")]
    Execution { message: String },

    #[error("causal metadata integrity violation: {message}")]
    Integrity { message: String },

    #[error("resource exhausted: {message}")]
    Resource { message: String },

    #[error("cursor contract violation: {message}")]
    ContractViolation { message: &'static str },
}

impl ExtractError {
    /// True when the condition may clear on retry (memory or disk pressure).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Resource { .. })
    }
}

impl CrrErrorCode for ExtractError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Schema(e) => e.error_code(),
            Self::Sql(e) => e.error_code(),
            Self::Prepare { .. } => error_code::PREPARE_ERROR,
            Self::Execution { .. } => error_code::EXECUTION_ERROR,
            Self::Integrity { .. } => error_code::INTEGRITY_ERROR,
            Self::Resource { .. } => error_code::RESOURCE_EXHAUSTED,
            Self::ContractViolation { .. } => error_code::CONTRACT_VIOLATION,
        }
    }
}
