//! Query synthesis for change extraction.
//!
//! Everything here is pure text production: identifiers are escaped as
//! identifiers, values are either escaped literals or named parameters, and
//! no I/O happens. The same named parameters (`:version`, `:exclude_site`)
//! recur in every branch of the union, so one binding serves all branches.

use crate::errors::SqlError;
use crate::schema::{TableInfo, CLOCK_COL_NAME, CLOCK_COL_SITE_ID, CLOCK_COL_VERSION};

use super::builder::SqlBuilder;
use super::quote::{quote_ident, split_pk_literals, PK_SEPARATOR_LITERAL};

/// Watermark version parameter, shared by every union branch.
pub const P_VERSION: &str = ":version";
/// Excluded-site parameter, shared by every union branch. Bind NULL to
/// exclude nothing: `IS NOT NULL` holds for every well-formed clock row.
pub const P_EXCLUDE_SITE: &str = ":exclude_site";
/// Keyset continuation parameters: the full sort key of the last row seen.
pub const P_AFTER_VRSN: &str = ":after_vrsn";
pub const P_AFTER_TBL: &str = ":after_tbl";
pub const P_AFTER_CID: &str = ":after_cid";
pub const P_AFTER_PKS: &str = ":after_pks";
/// Page bound for one keyset fetch.
pub const P_PAGE_SIZE: &str = ":page_size";
/// Site parameter of the aggregate version query.
pub const P_SITE: &str = ":site";

/// Sort key of the change stream. `vrsn, tbl` is the ordering contract
/// consumers rely on; `cid, pks` make the order fully deterministic, which
/// keyset continuation requires.
const ORDER_KEY: &str = "vrsn, tbl, cid, pks";

/// The quoted primary-key expression: one `quote(..)` per key column,
/// composite keys concatenated with the reserved separator.
fn pk_concat_expr(table: &TableInfo) -> String {
    let mut b = SqlBuilder::new();
    b.push_joined(
        table.pk_names(),
        &format!(" || {PK_SEPARATOR_LITERAL} || "),
        |b, name| {
            b.push("quote(").push_ident(name).push(")");
        },
    );
    b.finish()
}

/// Per-table extract over the clock table: every cell write newer than the
/// watermark and not originated by the excluded site.
pub fn changes_query_for_table(table: &TableInfo) -> String {
    let mut b = SqlBuilder::new();
    b.push("SELECT ")
        .push_literal(&table.tbl_name)
        .push(" AS tbl, ")
        .push(&pk_concat_expr(table))
        .push(" AS pks, ")
        .push_ident(CLOCK_COL_NAME)
        .push(" AS cid, ")
        .push_ident(CLOCK_COL_VERSION)
        .push(" AS vrsn, ")
        .push_ident(CLOCK_COL_SITE_ID)
        .push(" AS site_id FROM ")
        .push_ident(&table.clock_tbl_name)
        .push(" WHERE ")
        .push_ident(CLOCK_COL_SITE_ID)
        .push(" IS NOT ")
        .push(P_EXCLUDE_SITE)
        .push(" AND ")
        .push_ident(CLOCK_COL_VERSION)
        .push(" > ")
        .push(P_VERSION);
    b.finish()
}

/// A query with the stream's five-column shape and no rows, for scans over
/// an empty catalog.
fn empty_changes_query() -> String {
    "SELECT NULL AS tbl, NULL AS pks, NULL AS cid, NULL AS vrsn, \
     NULL AS site_id WHERE 0"
        .to_string()
}

fn union_of(tables: &[TableInfo]) -> String {
    let mut b = SqlBuilder::new();
    b.push_joined(tables, " UNION ", |b, t| {
        b.push(&changes_query_for_table(t));
    });
    b.finish()
}

/// The full ordered union of every tracked table's changes.
pub fn changes_union_query(tables: &[TableInfo]) -> String {
    if tables.is_empty() {
        return empty_changes_query();
    }
    let mut b = SqlBuilder::new();
    b.push("SELECT tbl, pks, cid, vrsn, site_id FROM (")
        .push(&union_of(tables))
        .push(") ORDER BY ")
        .push(ORDER_KEY)
        .push(" ASC");
    b.finish()
}

/// The union query in resumable page form: rows strictly after a given sort
/// key, bounded by a page size. One prepared statement serves a whole scan
/// by rebinding the continuation parameters.
pub fn changes_page_query(tables: &[TableInfo]) -> String {
    if tables.is_empty() {
        return empty_changes_query();
    }
    let mut b = SqlBuilder::new();
    b.push("SELECT tbl, pks, cid, vrsn, site_id FROM (")
        .push(&union_of(tables))
        .push(") WHERE (")
        .push(ORDER_KEY)
        .push(") > (")
        .push(P_AFTER_VRSN)
        .push(", ")
        .push(P_AFTER_TBL)
        .push(", ")
        .push(P_AFTER_CID)
        .push(", ")
        .push(P_AFTER_PKS)
        .push(") ORDER BY ")
        .push(ORDER_KEY)
        .push(" ASC LIMIT ")
        .push(P_PAGE_SIZE);
    b.finish()
}

/// Read the current quoted value of one column from the base table, keyed by
/// a primary-key literal produced by the extract queries above.
///
/// Composite keys are decomposed back into one equality predicate per key
/// column, in the order the literal was produced.
pub fn row_patch_data_query(
    table: &TableInfo,
    cid: &str,
    pks: &str,
) -> Result<String, SqlError> {
    let col = table.non_pk(cid).ok_or_else(|| SqlError::UnknownColumn {
        table: table.tbl_name.clone(),
        column: cid.to_string(),
    })?;

    let parts = split_pk_literals(pks)?;
    if parts.len() != table.pks.len() {
        return Err(SqlError::PrimaryKeyArity {
            table: table.tbl_name.clone(),
            expected: table.pks.len(),
            found: parts.len(),
        });
    }

    let mut b = SqlBuilder::new();
    b.push("SELECT quote(")
        .push_ident(&col.name)
        .push(") FROM ")
        .push_ident(&table.tbl_name)
        .push(" WHERE ")
        .push_joined(
            table.pk_names().zip(parts),
            " AND ",
            |b, (name, literal)| {
                b.push_ident(name).push(" = ").push(literal);
            },
        );
    Ok(b.finish())
}

/// Max causal version across a set of clock tables for one bound site.
/// Always returns exactly one row; NULL when the site has no writes.
pub fn db_version_union_query<S: AsRef<str>>(clock_tables: &[S]) -> String {
    let mut b = SqlBuilder::new();
    b.push("SELECT max(version) FROM (");
    if clock_tables.is_empty() {
        b.push("SELECT NULL AS version WHERE 0");
    } else {
        b.push_joined(clock_tables, " UNION ", |b, clock| {
            b.push("SELECT max(")
                .push_ident(CLOCK_COL_VERSION)
                .push(") AS version FROM ")
                .push_ident(clock.as_ref())
                .push(" WHERE ")
                .push_ident(CLOCK_COL_SITE_ID)
                .push(" = ")
                .push(P_SITE);
        });
    }
    b.push(")");
    b.finish()
}
