//! The changes-since pull cursor.
//!
//! One cursor runs one scan: discover tracked tables, prepare the union
//! extract query for a watermark, then hand rows out one at a time in
//! `(vrsn, tbl, cid, pks)` order. The union query is prepared once in its
//! keyset page form and re-bound per bounded page, so a scan holds O(page)
//! rows in memory no matter how many changes exist and resumes exactly
//! where the previous page ended.
//!
//! Lifecycle is a tagged state machine, not pointer-nullness:
//! `Unopened → Streaming → Exhausted → Closed`, with `Closed` reachable
//! from anywhere and teardown running synchronously on exhaustion and on
//! every error path.

use std::collections::VecDeque;
use std::mem;

use rusqlite::types::Value;
use rusqlite::{named_params, Connection, OptionalExtension, Statement};
use tracing::{debug, warn};

use crrsync_core::causal::Watermark;
use crrsync_core::errors::ExtractError;
use crrsync_core::schema::TableInfo;
use crrsync_core::sql;

use crate::catalog::{SchemaCatalog, SqliteCatalog};

/// Result shape declared to the host engine: five output columns plus the
/// hidden requestor input parameter.
pub const DECLARED_SHAPE: &str =
    "CREATE TABLE x(tbl, pks, cid, vrsn, site_id, requestor HIDDEN)";

pub const COL_TBL: usize = 0;
pub const COL_PKS: usize = 1;
pub const COL_CID: usize = 2;
pub const COL_VRSN: usize = 3;
pub const COL_SITE_ID: usize = 4;
pub const COL_REQUESTOR: usize = 5;

/// Advisory planner hints. No real index exists behind the union, so these
/// are constant placeholders.
pub const ESTIMATED_COST: f64 = 10.0;
pub const ESTIMATED_ROWS: i64 = 10;

/// Rows fetched per keyset page.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// One row of the change stream. Serializable so sync layers can ship
/// changesets as-is.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChangeRow {
    pub tbl: String,
    /// Quote-concatenated primary key, substitutable into SQL verbatim.
    pub pks: String,
    pub cid: String,
    pub vrsn: i64,
    pub site_id: Vec<u8>,
}

/// Cursor lifecycle operations, as the host query engine drives them.
pub trait ChangeCursor {
    /// Begin a scan: discover tracked tables, prepare the extract query,
    /// and position on the first row (or go straight to eof).
    fn filter(&mut self, watermark: &Watermark) -> Result<(), ExtractError>;
    /// Advance to the next row. Only valid while a row is ready.
    fn next(&mut self) -> Result<(), ExtractError>;
    fn eof(&self) -> bool;
    /// The row currently under the cursor.
    fn current(&self) -> Result<&ChangeRow, ExtractError>;
    /// Read one declared column of the current row.
    fn column(&self, idx: usize) -> Result<Value, ExtractError>;
    /// Ordinal of the current row within this scan, starting at 1.
    fn rowid(&self) -> Result<i64, ExtractError>;
    /// Release everything. Safe in any state, idempotent.
    fn close(&mut self) -> Result<(), ExtractError>;
}

/// The connect/declare end of the changes-since table: owns the catalog and
/// hands out cursors.
pub struct ChangesSinceTable<'conn> {
    conn: &'conn Connection,
    catalog: Box<dyn SchemaCatalog + 'conn>,
}

impl<'conn> ChangesSinceTable<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            catalog: Box::new(SqliteCatalog::new(conn)),
        }
    }

    /// Use a caller-provided catalog (e.g. a fixed table list in tests).
    pub fn with_catalog(
        conn: &'conn Connection,
        catalog: Box<dyn SchemaCatalog + 'conn>,
    ) -> Self {
        Self { conn, catalog }
    }

    pub fn declared_shape(&self) -> &'static str {
        DECLARED_SHAPE
    }

    pub fn open(&self) -> ChangesSinceCursor<'_> {
        ChangesSinceCursor {
            conn: self.conn,
            catalog: self.catalog.as_ref(),
            page_size: DEFAULT_PAGE_SIZE,
            state: State::Unopened,
        }
    }
}

enum State<'c> {
    Unopened,
    Streaming(Scan<'c>),
    Exhausted,
    Closed,
}

/// Everything one scan holds. Dropping it releases the prepared statements
/// and the table descriptors.
struct Scan<'c> {
    stmt: Statement<'c>,
    patch_stmt: Option<Statement<'c>>,
    tables: Vec<TableInfo>,
    version: i64,
    exclude: Value,
    page: VecDeque<ChangeRow>,
    /// Full sort key of the last row fetched, for keyset continuation.
    after: Option<(i64, String, String, String)>,
    /// The union query returned a short page; nothing more to fetch.
    source_drained: bool,
    current: Option<ChangeRow>,
    ordinal: i64,
    page_size: usize,
}

pub struct ChangesSinceCursor<'c> {
    conn: &'c Connection,
    catalog: &'c (dyn SchemaCatalog + 'c),
    page_size: usize,
    state: State<'c>,
}

impl<'c> ChangesSinceCursor<'c> {
    /// Override the keyset page size (mainly for tests).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Current quoted value of the changed cell, read from the base table.
    ///
    /// Prepared lazily, only when the consumer wants the value materialized;
    /// the statement replaces whatever patch statement the previous row
    /// prepared. `None` when the base row no longer exists (deleted since
    /// the clock entry was written).
    pub fn patch_value(&mut self) -> Result<Option<String>, ExtractError> {
        let State::Streaming(scan) = &mut self.state else {
            return Err(contract("patch_value called with no row ready"));
        };
        let row = scan
            .current
            .as_ref()
            .ok_or_else(|| contract("patch_value called with no row ready"))?;
        let table = scan
            .tables
            .iter()
            .find(|t| t.tbl_name == row.tbl)
            .ok_or_else(|| ExtractError::Integrity {
                message: format!("change row references untracked table {}", row.tbl),
            })?;

        let patch_sql = sql::row_patch_data_query(table, &row.cid, &row.pks)?;
        let mut stmt = self.conn.prepare(&patch_sql).map_err(classify_prepare)?;
        let value = stmt
            .query_row([], |r| r.get::<_, String>(0))
            .optional()
            .map_err(classify_step)?;
        scan.patch_stmt = Some(stmt);
        Ok(value)
    }

    /// Pop the next row, refilling the page from the prepared statement
    /// when needed.
    fn advance(scan: &mut Scan<'_>) -> Result<Option<ChangeRow>, ExtractError> {
        if scan.page.is_empty() && !scan.source_drained {
            Self::refill(scan)?;
        }
        Ok(scan.page.pop_front())
    }

    fn refill(scan: &mut Scan<'_>) -> Result<(), ExtractError> {
        let (after_vrsn, after_tbl, after_cid, after_pks) = match &scan.after {
            Some((v, t, c, p)) => (*v, t.clone(), c.clone(), p.clone()),
            // Before the first page: every row has vrsn > watermark, so the
            // watermark itself is a strict lower bound for the sort key.
            None => (scan.version, String::new(), String::new(), String::new()),
        };

        let fetched = {
            let Scan {
                stmt,
                page,
                version,
                exclude,
                page_size,
                ..
            } = scan;
            let mut rows = stmt
                .query(named_params! {
                    ":version": *version,
                    ":exclude_site": &*exclude,
                    ":after_vrsn": after_vrsn,
                    ":after_tbl": after_tbl,
                    ":after_cid": after_cid,
                    ":after_pks": after_pks,
                    ":page_size": *page_size as i64,
                })
                .map_err(classify_step)?;

            let mut fetched = 0usize;
            while let Some(row) = rows.next().map_err(classify_step)? {
                page.push_back(read_change_row(row)?);
                fetched += 1;
            }
            fetched
        };

        if fetched < scan.page_size {
            scan.source_drained = true;
        }
        if let Some(last) = scan.page.back() {
            scan.after = Some((
                last.vrsn,
                last.tbl.clone(),
                last.cid.clone(),
                last.pks.clone(),
            ));
        }
        debug!(fetched, drained = scan.source_drained, "refilled change page");
        Ok(())
    }
}

impl ChangeCursor for ChangesSinceCursor<'_> {
    fn filter(&mut self, watermark: &Watermark) -> Result<(), ExtractError> {
        if matches!(self.state, State::Closed) {
            return Err(contract("filter called on a closed cursor"));
        }
        // Rewind: release whatever the previous scan still holds.
        if let State::Streaming(old) = mem::replace(&mut self.state, State::Unopened) {
            teardown(old);
        }

        let names = self.catalog.tracked_tables()?;
        if names.is_empty() {
            debug!("no tracked tables; scan is empty");
            self.state = State::Exhausted;
            return Ok(());
        }

        let mut tables = Vec::with_capacity(names.len());
        for name in &names {
            // Partial state is just `tables`; dropped on error return.
            tables.push(self.catalog.table_info(name)?);
        }

        let page_sql = sql::changes_page_query(&tables);
        let stmt = self.conn.prepare(&page_sql).map_err(classify_prepare)?;

        let exclude = match &watermark.exclude_site {
            Some(site) => Value::Blob(site.as_bytes().to_vec()),
            None => Value::Null,
        };
        debug!(
            tables = tables.len(),
            version = watermark.version,
            excluding = watermark.exclude_site.is_some(),
            "starting change scan"
        );

        let mut scan = Scan {
            stmt,
            patch_stmt: None,
            tables,
            version: watermark.version,
            exclude,
            page: VecDeque::new(),
            after: None,
            source_drained: false,
            current: None,
            ordinal: 0,
            page_size: self.page_size,
        };

        match Self::advance(&mut scan) {
            Ok(Some(row)) => {
                scan.current = Some(row);
                scan.ordinal = 1;
                self.state = State::Streaming(scan);
                Ok(())
            }
            Ok(None) => {
                teardown(scan);
                self.state = State::Exhausted;
                Ok(())
            }
            Err(e) => {
                teardown(scan);
                self.state = State::Exhausted;
                Err(e)
            }
        }
    }

    fn next(&mut self) -> Result<(), ExtractError> {
        match mem::replace(&mut self.state, State::Exhausted) {
            State::Streaming(mut scan) => match Self::advance(&mut scan) {
                Ok(Some(row)) => {
                    scan.current = Some(row);
                    scan.ordinal += 1;
                    self.state = State::Streaming(scan);
                    Ok(())
                }
                Ok(None) => {
                    // Exhausted: release the statement and descriptors now,
                    // not at close time.
                    teardown(scan);
                    Ok(())
                }
                Err(e) => {
                    teardown(scan);
                    Err(e)
                }
            },
            other => {
                self.state = other;
                Err(contract("next called with no row ready"))
            }
        }
    }

    fn eof(&self) -> bool {
        !matches!(self.state, State::Streaming(_))
    }

    fn current(&self) -> Result<&ChangeRow, ExtractError> {
        match &self.state {
            State::Streaming(scan) => scan
                .current
                .as_ref()
                .ok_or_else(|| contract("no row ready")),
            _ => Err(contract("row access with no row ready")),
        }
    }

    fn column(&self, idx: usize) -> Result<Value, ExtractError> {
        let row = self.current()?;
        match idx {
            COL_TBL => Ok(Value::Text(row.tbl.clone())),
            COL_PKS => Ok(Value::Text(row.pks.clone())),
            COL_CID => Ok(Value::Text(row.cid.clone())),
            COL_VRSN => Ok(Value::Integer(row.vrsn)),
            COL_SITE_ID => Ok(Value::Blob(row.site_id.clone())),
            // The hidden requestor parameter is input-only.
            COL_REQUESTOR => Ok(Value::Null),
            _ => Err(contract("column index out of range")),
        }
    }

    fn rowid(&self) -> Result<i64, ExtractError> {
        match &self.state {
            State::Streaming(scan) if scan.current.is_some() => Ok(scan.ordinal),
            _ => Err(contract("rowid access with no row ready")),
        }
    }

    fn close(&mut self) -> Result<(), ExtractError> {
        if let State::Streaming(scan) = mem::replace(&mut self.state, State::Closed) {
            teardown(scan);
        }
        Ok(())
    }
}

/// Finalize a scan's statements explicitly so failures can be logged.
/// Teardown failures never mask the error that triggered teardown.
fn teardown(scan: Scan<'_>) {
    let Scan {
        stmt, patch_stmt, ..
    } = scan;
    if let Err(e) = stmt.finalize() {
        warn!(error = %e, "failed to finalize changes statement");
    }
    if let Some(patch) = patch_stmt {
        if let Err(e) = patch.finalize() {
            warn!(error = %e, "failed to finalize patch statement");
        }
    }
    // `tables` and the buffered page drop here.
}

fn read_change_row(row: &rusqlite::Row<'_>) -> Result<ChangeRow, ExtractError> {
    use rusqlite::types::ValueRef;

    let text = |idx: usize, what: &str| -> Result<String, ExtractError> {
        match row.get_ref(idx).map_err(classify_step)? {
            ValueRef::Text(t) => String::from_utf8(t.to_vec()).map_err(|_| {
                ExtractError::Integrity {
                    message: format!("{what} is not valid UTF-8"),
                }
            }),
            other => Err(ExtractError::Integrity {
                message: format!("{what} has unexpected type {}", other.data_type()),
            }),
        }
    };

    let tbl = text(COL_TBL, "table name")?;
    let pks = text(COL_PKS, "primary key encoding")?;
    let cid = text(COL_CID, "column identifier")?;

    let vrsn = match row.get_ref(COL_VRSN).map_err(classify_step)? {
        ValueRef::Integer(v) => v,
        other => {
            return Err(ExtractError::Integrity {
                message: format!("version has unexpected type {}", other.data_type()),
            })
        }
    };
    if vrsn <= 0 {
        return Err(ExtractError::Integrity {
            message: format!("non-positive causal version {vrsn} for {tbl}.{cid}"),
        });
    }

    let site_id = match row.get_ref(COL_SITE_ID).map_err(classify_step)? {
        ValueRef::Blob(b) => b.to_vec(),
        ValueRef::Text(t) => t.to_vec(),
        other => {
            return Err(ExtractError::Integrity {
                message: format!("site id has unexpected type {}", other.data_type()),
            })
        }
    };
    if site_id.is_empty() {
        return Err(ExtractError::Integrity {
            message: format!("empty site id for {tbl}.{cid}"),
        });
    }

    Ok(ChangeRow {
        tbl,
        pks,
        cid,
        vrsn,
        site_id,
    })
}

fn contract(message: &'static str) -> ExtractError {
    ExtractError::ContractViolation { message }
}

fn is_resource(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if matches!(
                f.code,
                rusqlite::ErrorCode::OutOfMemory | rusqlite::ErrorCode::DiskFull
            )
    )
}

fn classify_prepare(e: rusqlite::Error) -> ExtractError {
    if is_resource(&e) {
        ExtractError::Resource {
            message: e.to_string(),
        }
    } else {
        ExtractError::Prepare {
            message: e.to_string(),
        }
    }
}

fn classify_step(e: rusqlite::Error) -> ExtractError {
    if is_resource(&e) {
        ExtractError::Resource {
            message: e.to_string(),
        }
    } else {
        ExtractError::Execution {
            message: e.to_string(),
        }
    }
}
