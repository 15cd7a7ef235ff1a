//! crrsync-storage: the SQLite side of CRR change extraction.
//!
//! - Catalog: discover tracked tables and build their descriptors
//! - Connection: open databases with the pragmas CRR scans expect
//! - Cursor: the changes-since pull cursor over the union extract query
//! - Version: aggregate max-version queries for collaborators

pub mod catalog;
pub mod connection;
pub mod cursor;
pub mod version;

pub use catalog::{check_table_compatible, SchemaCatalog, SqliteCatalog};
pub use cursor::{ChangeCursor, ChangeRow, ChangesSinceCursor, ChangesSinceTable};
pub use version::db_version;
