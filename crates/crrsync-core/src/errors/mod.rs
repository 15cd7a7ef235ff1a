//! Error handling for crrsync.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod error_code;
pub mod extract_error;
pub mod schema_error;
pub mod sql_error;

pub use error_code::CrrErrorCode;
pub use extract_error::ExtractError;
pub use schema_error::SchemaError;
pub use sql_error::SqlError;
