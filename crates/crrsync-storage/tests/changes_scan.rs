//! End-to-end scans over real clock tables.

use rusqlite::Connection;

use crrsync_core::causal::{SiteId, Watermark};
use crrsync_storage::cursor::{ChangeCursor, ChangeRow, ChangesSinceTable};
use crrsync_storage::db_version;

fn crr_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE foo (a PRIMARY KEY, b, c, d);
         CREATE TABLE foo__crr_clock (a, __crr_col_name TEXT,
             __crr_version INTEGER, __crr_site_id BLOB,
             PRIMARY KEY (a, __crr_col_name));
         CREATE TABLE bar (x PRIMARY KEY, y);
         CREATE TABLE bar__crr_clock (x, __crr_col_name TEXT,
             __crr_version INTEGER, __crr_site_id BLOB,
             PRIMARY KEY (x, __crr_col_name));",
    )
    .unwrap();
    conn
}

fn clock(conn: &Connection, table: &str, pk: &str, col: &str, vrsn: i64, site: &[u8]) {
    conn.execute(
        &format!("INSERT INTO {table}__crr_clock VALUES ({pk}, ?1, ?2, ?3)"),
        rusqlite::params![col, vrsn, site],
    )
    .unwrap();
}

fn collect(cursor: &mut impl ChangeCursor, watermark: &Watermark) -> Vec<ChangeRow> {
    cursor.filter(watermark).unwrap();
    let mut rows = Vec::new();
    while !cursor.eof() {
        rows.push(cursor.current().unwrap().clone());
        cursor.next().unwrap();
    }
    rows
}

#[test]
fn single_write_yields_one_change_row() {
    let conn = crr_db();
    clock(&conn, "foo", "1", "b", 5, b"S1");

    let table = ChangesSinceTable::new(&conn);
    let rows = collect(&mut table.open(), &Watermark::everything());

    assert_eq!(
        rows,
        vec![ChangeRow {
            tbl: "foo".to_string(),
            pks: "1".to_string(),
            cid: "b".to_string(),
            vrsn: 5,
            site_id: b"S1".to_vec(),
        }]
    );
}

#[test]
fn stream_is_ordered_by_version_then_table() {
    let conn = crr_db();
    clock(&conn, "foo", "1", "b", 7, b"S1");
    clock(&conn, "bar", "9", "y", 7, b"S1");
    clock(&conn, "foo", "2", "c", 3, b"S2");
    clock(&conn, "bar", "8", "y", 12, b"S2");

    let table = ChangesSinceTable::new(&conn);
    let rows = collect(&mut table.open(), &Watermark::everything());

    let keys: Vec<(i64, &str)> = rows.iter().map(|r| (r.vrsn, r.tbl.as_str())).collect();
    // Version ascending; the version-7 tie breaks lexicographically on the
    // table name, so bar precedes foo.
    assert_eq!(keys, vec![(3, "foo"), (7, "bar"), (7, "foo"), (12, "bar")]);
}

#[test]
fn repeated_scans_from_one_watermark_are_identical() {
    let conn = crr_db();
    clock(&conn, "foo", "1", "b", 7, b"S1");
    clock(&conn, "foo", "1", "c", 7, b"S1");
    clock(&conn, "foo", "2", "b", 7, b"S1");
    clock(&conn, "bar", "3", "y", 9, b"S2");

    let table = ChangesSinceTable::new(&conn);
    let first = collect(&mut table.open(), &Watermark::everything());
    let second = collect(&mut table.open(), &Watermark::everything());
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[test]
fn watermark_is_exact() {
    let conn = crr_db();
    for v in 1..=6 {
        clock(&conn, "foo", &v.to_string(), "b", v, b"S1");
    }

    let table = ChangesSinceTable::new(&conn);
    let rows = collect(&mut table.open(), &Watermark::new(3, None));

    // Nothing at or below the watermark, everything above, exactly once.
    let versions: Vec<i64> = rows.iter().map(|r| r.vrsn).collect();
    assert_eq!(versions, vec![4, 5, 6]);
}

#[test]
fn excluded_site_rows_are_omitted() {
    let conn = crr_db();
    clock(&conn, "foo", "1", "b", 1, b"S1");
    clock(&conn, "foo", "2", "b", 2, b"S2");
    clock(&conn, "foo", "3", "b", 3, b"S1");

    let table = ChangesSinceTable::new(&conn);
    let rows = collect(
        &mut table.open(),
        &Watermark::new(0, Some(SiteId::from("S1"))),
    );

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].site_id, b"S2".to_vec());
}

#[test]
fn patch_value_reads_the_current_base_cell() {
    let conn = crr_db();
    conn.execute("INSERT INTO foo VALUES (1, 'cb', 'cc', 'cd')", [])
        .unwrap();
    clock(&conn, "foo", "1", "b", 5, b"S1");

    let table = ChangesSinceTable::new(&conn);
    let mut cursor = table.open();
    cursor.filter(&Watermark::everything()).unwrap();
    assert_eq!(cursor.current().unwrap().cid, "b");
    assert_eq!(cursor.patch_value().unwrap(), Some("'cb'".to_string()));

    // The value tracks the base table, not the causal metadata.
    conn.execute("UPDATE foo SET b = 'cb2' WHERE a = 1", [])
        .unwrap();
    assert_eq!(cursor.patch_value().unwrap(), Some("'cb2'".to_string()));

    conn.execute("DELETE FROM foo WHERE a = 1", []).unwrap();
    assert_eq!(cursor.patch_value().unwrap(), None);
}

#[test]
fn hostile_composite_keys_round_trip_through_patch_queries() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE t (k1 TEXT, k2 TEXT, v, PRIMARY KEY (k1, k2));
         CREATE TABLE t__crr_clock (k1 TEXT, k2 TEXT, __crr_col_name TEXT,
             __crr_version INTEGER, __crr_site_id BLOB);",
    )
    .unwrap();
    // Keys chosen to stress the encoding: a trailing tilde puts separator
    // bytes at a literal boundary, and an embedded quote plus separator
    // bytes inside a value must survive quoting.
    conn.execute(
        "INSERT INTO t VALUES ('x~', 'a''b', 'first')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO t VALUES ('x', '~a''b', 'second')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO t__crr_clock VALUES ('x~', 'a''b', 'v', 1, X'5331')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO t__crr_clock VALUES ('x', '~a''b', 'v', 2, X'5331')",
        [],
    )
    .unwrap();

    let table = ChangesSinceTable::new(&conn);
    let mut cursor = table.open();
    cursor.filter(&Watermark::everything()).unwrap();

    // First change row targets the ('x~', 'a'b') base row and no other.
    assert_eq!(cursor.current().unwrap().vrsn, 1);
    assert_eq!(cursor.patch_value().unwrap(), Some("'first'".to_string()));

    cursor.next().unwrap();
    assert_eq!(cursor.current().unwrap().vrsn, 2);
    assert_eq!(cursor.patch_value().unwrap(), Some("'second'".to_string()));

    cursor.next().unwrap();
    assert!(cursor.eof());
}

#[test]
fn no_tracked_tables_is_an_empty_stream() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE plain (a PRIMARY KEY, b);")
        .unwrap();

    let table = ChangesSinceTable::new(&conn);
    let rows = collect(&mut table.open(), &Watermark::everything());
    assert!(rows.is_empty());
}

#[test]
fn dropping_a_cursor_mid_stream_leaks_nothing() {
    let conn = crr_db();
    for v in 1..=20 {
        clock(&conn, "foo", &v.to_string(), "b", v, b"S1");
    }

    {
        let table = ChangesSinceTable::new(&conn);
        let mut cursor = table.open().with_page_size(4);
        cursor.filter(&Watermark::everything()).unwrap();
        cursor.next().unwrap();
        // Dropped mid-stream without close().
    }

    // The connection is fully usable afterwards; no statement left behind.
    let count: i64 = conn
        .query_row("SELECT count(*) FROM foo__crr_clock", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 20);
}

#[test]
fn scan_and_version_work_on_a_file_backed_db() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crr.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE foo (a PRIMARY KEY, b);
         CREATE TABLE foo__crr_clock (a, __crr_col_name TEXT,
             __crr_version INTEGER, __crr_site_id BLOB);
         INSERT INTO foo__crr_clock VALUES (1, 'b', 5, X'5331');",
    )
    .unwrap();

    let table = ChangesSinceTable::new(&conn);
    let rows = collect(&mut table.open(), &Watermark::everything());
    assert_eq!(rows.len(), 1);

    assert_eq!(db_version(&conn, &SiteId::from("S1")).unwrap(), Some(5));
    assert_eq!(db_version(&conn, &SiteId::from("S2")).unwrap(), None);
}
