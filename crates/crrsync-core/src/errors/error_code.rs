//! Stable error codes for host bindings and logs.

pub const SCHEMA_ERROR: &str = "CRR_SCHEMA";
pub const SQL_ERROR: &str = "CRR_SQL";
pub const PREPARE_ERROR: &str = "CRR_PREPARE";
pub const EXECUTION_ERROR: &str = "CRR_EXECUTION";
pub const INTEGRITY_ERROR: &str = "CRR_INTEGRITY";
pub const RESOURCE_EXHAUSTED: &str = "CRR_RESOURCE";
pub const CONTRACT_VIOLATION: &str = "CRR_CONTRACT";

/// Maps an error to a stable machine-readable code.
///
/// Codes classify; they never encode magnitude or severity.
pub trait CrrErrorCode {
    fn error_code(&self) -> &'static str;
}
