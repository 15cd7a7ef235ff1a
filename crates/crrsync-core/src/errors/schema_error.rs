//! Schema errors: a tracked table or its clock table is unusable.

use super::error_code::{self, CrrErrorCode};

/// Errors reported while introspecting tracked tables.
///
/// All of these abort a scan during the filter phase, before any row is
/// produced.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("tracked table {table} does not exist")]
    MissingTable { table: String },

    #[error("table {table} has no primary key; CRR tables must have one")]
    NoPrimaryKey { table: String },

    #[error("clock table {clock_table} for {table} is missing")]
    MissingClockTable { table: String, clock_table: String },

    #[error("table {table} is not CRR-compatible: {reason}")]
    Incompatible { table: String, reason: String },

    #[error("schema introspection failed: {message}")]
    Introspection { message: String },
}

impl CrrErrorCode for SchemaError {
    fn error_code(&self) -> &'static str {
        error_code::SCHEMA_ERROR
    }
}
