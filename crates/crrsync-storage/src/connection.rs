//! Connection setup for databases holding CRR tables.
//!
//! WAL keeps change scans unblocked while collaborators write clock rows;
//! the busy timeout absorbs short write bursts instead of surfacing
//! SQLITE_BUSY to the cursor.

use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crrsync_core::errors::ExtractError;

/// Open a file-backed database and apply the standard pragmas.
pub fn open(path: impl AsRef<Path>) -> Result<Connection, ExtractError> {
    let conn = Connection::open(path.as_ref()).map_err(open_error)?;
    apply_pragmas(&conn)?;
    debug!(path = %path.as_ref().display(), "opened database");
    Ok(conn)
}

/// Open an in-memory database with the same pragma set. The journal mode
/// stays `memory` there; everything else applies as usual.
pub fn open_in_memory() -> Result<Connection, ExtractError> {
    let conn = Connection::open_in_memory().map_err(open_error)?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

/// Apply the pragmas every connection gets.
pub fn apply_pragmas(conn: &Connection) -> Result<(), ExtractError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .map_err(open_error)
}

fn open_error(e: rusqlite::Error) -> ExtractError {
    ExtractError::Execution {
        message: e.to_string(),
    }
}
