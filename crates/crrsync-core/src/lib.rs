//! crrsync-core: change extraction primitives for CRR tables.
//!
//! A CRR (conflict-free replicated relational) table is an ordinary SQLite
//! table whose cell writes are mirrored into a side "clock" table recording,
//! per (primary key, column), the causal version and originating site of the
//! last write. This crate holds everything that does not touch a database
//! connection:
//! - Errors: one enum per subsystem, `thiserror` only
//! - Causal: site identifiers, versions, watermarks
//! - Schema: table/column descriptors for tracked tables
//! - Sql: quoting, primary-key tuple encoding, and query synthesis

pub mod causal;
pub mod errors;
pub mod schema;
pub mod sql;

// Re-exports for convenience
pub use causal::{SiteId, Version, Watermark};
pub use errors::{CrrErrorCode, ExtractError, SchemaError, SqlError};
pub use schema::{ColumnInfo, TableInfo, CLOCK_TABLE_SUFFIX};
