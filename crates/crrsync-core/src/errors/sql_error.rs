//! Query-synthesis errors.

use super::error_code::{self, CrrErrorCode};

/// Errors that can occur while synthesizing SQL text.
#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("column {column} is not a tracked column of {table}")]
    UnknownColumn { table: String, column: String },

    #[error(
        "primary key literal for {table} has {found} parts, expected {expected}"
    )]
    PrimaryKeyArity {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("malformed primary key encoding: {encoded}")]
    MalformedPrimaryKey { encoded: String },

    #[error("malformed column version map: {message}")]
    MalformedVersionMap { message: String },
}

impl CrrErrorCode for SqlError {
    fn error_code(&self) -> &'static str {
        error_code::SQL_ERROR
    }
}
