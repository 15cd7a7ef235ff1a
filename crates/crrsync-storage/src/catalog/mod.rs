//! Schema catalog: which tables are tracked, and what do they look like.
//!
//! The cursor consumes this through the `SchemaCatalog` trait so its scan
//! logic can be exercised against a hand-built catalog in tests; the real
//! implementation introspects SQLite's pragma functions.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crrsync_core::errors::SchemaError;
use crrsync_core::schema::{clock_table_name, ColumnInfo, TableInfo, CLOCK_TABLE_SUFFIX};

/// Provider of tracked-table names and their descriptors.
///
/// Listing order carries no meaning; the union query re-sorts.
pub trait SchemaCatalog {
    fn tracked_tables(&self) -> Result<Vec<String>, SchemaError>;
    fn table_info(&self, table: &str) -> Result<TableInfo, SchemaError>;
}

/// Catalog backed by a live SQLite connection.
pub struct SqliteCatalog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SchemaCatalog for SqliteCatalog<'_> {
    /// Every table with a clock side table is tracked.
    fn tracked_tables(&self) -> Result<Vec<String>, SchemaError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name LIKE '%__crr_clock'
                 ORDER BY name",
            )
            .map_err(introspection)?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(introspection)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(introspection)?;

        // LIKE underscores are wildcards; keep only exact suffix matches.
        let tracked: Vec<String> = names
            .iter()
            .filter_map(|n| n.strip_suffix(CLOCK_TABLE_SUFFIX))
            .filter(|base| !base.is_empty())
            .map(str::to_string)
            .collect();
        debug!(count = tracked.len(), "listed tracked tables");
        Ok(tracked)
    }

    fn table_info(&self, table: &str) -> Result<TableInfo, SchemaError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT \"cid\", \"name\", \"type\", \"notnull\", \"pk\"
                 FROM pragma_table_info(?1) ORDER BY cid ASC",
            )
            .map_err(introspection)?;

        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnInfo {
                    cid: row.get(0)?,
                    name: row.get(1)?,
                    type_: row.get(2)?,
                    notnull: row.get::<_, i32>(3)? != 0,
                    pk: row.get(4)?,
                })
            })
            .map_err(introspection)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(introspection)?;

        if columns.is_empty() {
            return Err(SchemaError::MissingTable {
                table: table.to_string(),
            });
        }
        if !columns.iter().any(|c| c.pk > 0) {
            return Err(SchemaError::NoPrimaryKey {
                table: table.to_string(),
            });
        }

        let clock_table = clock_table_name(table);
        if !table_exists(self.conn, &clock_table)? {
            return Err(SchemaError::MissingClockTable {
                table: table.to_string(),
                clock_table,
            });
        }

        Ok(TableInfo::from_columns(table, columns))
    }
}

/// Check whether a table of the given exact name exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, SchemaError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()
        .map_err(introspection)?;
    Ok(found.is_some())
}

/// Validate that a table can be tracked as a CRR.
///
/// The restrictions exist because replicated writes bypass local constraint
/// enforcement: a constraint another site cannot see is a constraint that
/// will eventually be violated.
pub fn check_table_compatible(conn: &Connection, table: &str) -> Result<(), SchemaError> {
    let incompatible = |reason: &str| SchemaError::Incompatible {
        table: table.to_string(),
        reason: reason.to_string(),
    };

    if count(
        conn,
        "SELECT count(*) FROM pragma_index_list(?1)
         WHERE \"origin\" != 'pk' AND \"unique\" = 1",
        table,
    )? != 0
    {
        return Err(incompatible("unique indices besides the primary key"));
    }

    // pragma_index_list omits rowid-aliasing primary keys, so check
    // pragma_table_info instead
    if count(
        conn,
        "SELECT count(*) FROM pragma_table_info(?1) WHERE \"pk\" > 0",
        table,
    )? == 0
    {
        return Err(SchemaError::NoPrimaryKey {
            table: table.to_string(),
        });
    }

    let autoincrement: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE name = ?1 AND type = 'table'
             AND sql LIKE '%autoincrement%' LIMIT 1",
            [table],
            |row| row.get(0),
        )
        .optional()
        .map_err(introspection)?;
    if autoincrement.is_some() {
        return Err(incompatible(
            "auto-increment primary key; two sites would hand out the same key",
        ));
    }

    if count(
        conn,
        "SELECT count(*) FROM pragma_foreign_key_list(?1)",
        table,
    )? != 0
    {
        return Err(incompatible("checked foreign key constraints"));
    }

    if count(
        conn,
        "SELECT count(*) FROM pragma_table_xinfo(?1)
         WHERE \"notnull\" = 1 AND \"dflt_value\" IS NULL AND \"pk\" = 0",
        table,
    )? != 0
    {
        return Err(incompatible(
            "NOT NULL column without a default value",
        ));
    }

    Ok(())
}

fn count(conn: &Connection, sql: &str, table: &str) -> Result<i64, SchemaError> {
    conn.query_row(sql, [table], |row| row.get(0))
        .map_err(introspection)
}

fn introspection(e: rusqlite::Error) -> SchemaError {
    SchemaError::Introspection {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE foo (a PRIMARY KEY, b);
             CREATE TABLE foo__crr_clock (
                 a, __crr_col_name TEXT, __crr_version INTEGER,
                 __crr_site_id, PRIMARY KEY (a, __crr_col_name)
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn lists_tracked_tables_by_clock_suffix() {
        let conn = setup_db();
        conn.execute_batch("CREATE TABLE untracked (x PRIMARY KEY);")
            .unwrap();
        let catalog = SqliteCatalog::new(&conn);
        assert_eq!(catalog.tracked_tables().unwrap(), vec!["foo"]);
    }

    #[test]
    fn builds_table_info_with_partitioned_columns() {
        let conn = setup_db();
        let catalog = SqliteCatalog::new(&conn);
        let info = catalog.table_info("foo").unwrap();
        assert_eq!(info.tbl_name, "foo");
        assert_eq!(info.pk_names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(info.non_pks.len(), 1);
        assert_eq!(info.non_pks[0].name, "b");
        assert_eq!(info.clock_tbl_name, "foo__crr_clock");
    }

    #[test]
    fn composite_key_ordering_follows_declaration() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (x, y, z, PRIMARY KEY (z, x));
             CREATE TABLE t__crr_clock (z, x, __crr_col_name,
                 __crr_version, __crr_site_id);",
        )
        .unwrap();
        let info = SqliteCatalog::new(&conn).table_info("t").unwrap();
        assert_eq!(info.pk_names().collect::<Vec<_>>(), vec!["z", "x"]);
    }

    #[test]
    fn missing_table_is_a_structured_error() {
        let conn = setup_db();
        let err = SqliteCatalog::new(&conn).table_info("nope").unwrap_err();
        assert!(matches!(err, SchemaError::MissingTable { .. }));
    }

    #[test]
    fn table_without_primary_key_is_rejected() {
        let conn = setup_db();
        conn.execute_batch(
            "CREATE TABLE nopk (a, b);
             CREATE TABLE nopk__crr_clock (a, __crr_col_name,
                 __crr_version, __crr_site_id);",
        )
        .unwrap();
        let err = SqliteCatalog::new(&conn).table_info("nopk").unwrap_err();
        assert!(matches!(err, SchemaError::NoPrimaryKey { .. }));
    }

    #[test]
    fn missing_clock_table_is_rejected() {
        let conn = setup_db();
        conn.execute_batch("CREATE TABLE lonely (a PRIMARY KEY, b);")
            .unwrap();
        let err = SqliteCatalog::new(&conn).table_info("lonely").unwrap_err();
        assert!(matches!(err, SchemaError::MissingClockTable { .. }));
    }

    #[test]
    fn compatibility_accepts_plain_crr_shape() {
        let conn = setup_db();
        check_table_compatible(&conn, "foo").unwrap();
    }

    #[test]
    fn compatibility_rejects_extra_unique_index() {
        let conn = setup_db();
        conn.execute_batch("CREATE UNIQUE INDEX foo_b ON foo(b);")
            .unwrap();
        assert!(matches!(
            check_table_compatible(&conn, "foo"),
            Err(SchemaError::Incompatible { .. })
        ));
    }

    #[test]
    fn compatibility_rejects_autoincrement() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ai (id INTEGER PRIMARY KEY AUTOINCREMENT, v);",
        )
        .unwrap();
        assert!(matches!(
            check_table_compatible(&conn, "ai"),
            Err(SchemaError::Incompatible { .. })
        ));
    }

    #[test]
    fn compatibility_rejects_not_null_without_default() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE nn (a PRIMARY KEY, b TEXT NOT NULL);",
        )
        .unwrap();
        assert!(matches!(
            check_table_compatible(&conn, "nn"),
            Err(SchemaError::Incompatible { .. })
        ));
    }
}
