//! Schema descriptors for tracked tables.

use serde_json::Value as JsonValue;

use crate::errors::SqlError;

/// Suffix appended to a tracked table's name to form its clock table.
pub const CLOCK_TABLE_SUFFIX: &str = "__crr_clock";

/// Clock-table column holding the changed column's name.
pub const CLOCK_COL_NAME: &str = "__crr_col_name";
/// Clock-table column holding the causal version of the last write.
pub const CLOCK_COL_VERSION: &str = "__crr_version";
/// Clock-table column holding the originating site of the last write.
pub const CLOCK_COL_SITE_ID: &str = "__crr_site_id";

/// Name of the clock table tracking `table`.
pub fn clock_table_name(table: &str) -> String {
    format!("{table}{CLOCK_TABLE_SUFFIX}")
}

/// One column of a tracked table, as reported by `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub cid: i32,
    pub name: String,
    pub type_: String,
    pub notnull: bool,
    // > 0 for primary key columns; the value is the 1-based position in the
    // PRIMARY KEY (cols...) declaration
    pub pk: i32,
}

/// Descriptor for one tracked table and its clock table.
///
/// Immutable once constructed. A scan builds one per tracked table during
/// its filter phase and drops them all when the scan ends or fails.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub tbl_name: String,
    /// Primary key columns, ordered by their position in the key.
    pub pks: Vec<ColumnInfo>,
    /// Remaining columns, in declaration order.
    pub non_pks: Vec<ColumnInfo>,
    pub clock_tbl_name: String,
}

impl TableInfo {
    /// Build a descriptor from the full `pragma_table_info` column list.
    /// Columns must arrive in `cid` order; pk columns are re-sorted by their
    /// key position.
    pub fn from_columns(table: &str, columns: Vec<ColumnInfo>) -> Self {
        let (mut pks, non_pks): (Vec<_>, Vec<_>) =
            columns.into_iter().partition(|c| c.pk > 0);
        pks.sort_by_key(|c| c.pk);
        Self {
            tbl_name: table.to_string(),
            pks,
            non_pks,
            clock_tbl_name: clock_table_name(table),
        }
    }

    pub fn pk_names(&self) -> impl Iterator<Item = &str> {
        self.pks.iter().map(|c| c.name.as_str())
    }

    /// Look up a non-key column by name.
    pub fn non_pk(&self, name: &str) -> Option<&ColumnInfo> {
        self.non_pks.iter().find(|c| c.name == name)
    }

    /// Select the columns a patch must touch, from the JSON column→version
    /// map carried in a changeset payload (e.g. `{"b":5,"c":5}`).
    ///
    /// Returns the matching non-key columns preserving this table's column
    /// order. Map entries naming unknown columns are ignored: a peer may
    /// know columns we do not.
    pub fn columns_in_version_map(
        &self,
        version_map_json: &str,
    ) -> Result<Vec<&ColumnInfo>, SqlError> {
        let parsed: JsonValue = serde_json::from_str(version_map_json)
            .map_err(|e| SqlError::MalformedVersionMap {
                message: e.to_string(),
            })?;
        let map = parsed
            .as_object()
            .ok_or_else(|| SqlError::MalformedVersionMap {
                message: "expected a JSON object".to_string(),
            })?;

        Ok(self
            .non_pks
            .iter()
            .filter(|c| map.contains_key(&c.name))
            .collect())
    }
}
