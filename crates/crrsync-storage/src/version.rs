//! Aggregate version queries for collaborators.

use rusqlite::{named_params, Connection};
use tracing::debug;

use crrsync_core::causal::{SiteId, Version};
use crrsync_core::errors::ExtractError;
use crrsync_core::schema::clock_table_name;
use crrsync_core::sql;

use crate::catalog::{SchemaCatalog, SqliteCatalog};

/// The highest causal version this database has recorded for `site`,
/// across every tracked table. `None` when the site has written nothing
/// (including when no tables are tracked).
///
/// This is how a replica computes "our current version" before asking a
/// peer for changes since it.
pub fn db_version(conn: &Connection, site: &SiteId) -> Result<Option<Version>, ExtractError> {
    let tracked = SqliteCatalog::new(conn).tracked_tables()?;
    if tracked.is_empty() {
        return Ok(None);
    }
    let clocks: Vec<String> = tracked.iter().map(|t| clock_table_name(t)).collect();

    let query = sql::db_version_union_query(&clocks);
    let version: Option<Version> = conn
        .query_row(
            &query,
            named_params! { ":site": site.as_bytes() },
            |row| row.get(0),
        )
        .map_err(|e| ExtractError::Execution {
            message: e.to_string(),
        })?;

    debug!(tables = clocks.len(), ?version, "computed site version");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tracked_tables_means_no_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(db_version(&conn, &SiteId::from("S1")).unwrap(), None);
    }

    #[test]
    fn takes_the_max_across_clock_tables_for_one_site() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE foo (a PRIMARY KEY, b);
             CREATE TABLE foo__crr_clock (a, __crr_col_name,
                 __crr_version INTEGER, __crr_site_id BLOB);
             CREATE TABLE bar (x PRIMARY KEY, y);
             CREATE TABLE bar__crr_clock (x, __crr_col_name,
                 __crr_version INTEGER, __crr_site_id BLOB);
             INSERT INTO foo__crr_clock VALUES (1, 'b', 3, X'5331');
             INSERT INTO bar__crr_clock VALUES (9, 'y', 7, X'5331');
             INSERT INTO bar__crr_clock VALUES (8, 'y', 11, X'5332');",
        )
        .unwrap();

        // X'5331' is S1, X'5332' is S2
        assert_eq!(db_version(&conn, &SiteId::from("S1")).unwrap(), Some(7));
        assert_eq!(db_version(&conn, &SiteId::from("S2")).unwrap(), Some(11));
        assert_eq!(db_version(&conn, &SiteId::from("S3")).unwrap(), None);
    }
}
