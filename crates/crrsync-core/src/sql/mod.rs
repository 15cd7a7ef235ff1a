//! SQL synthesis: quoting, text assembly, and the change-extraction queries.

pub mod builder;
pub mod changes;
pub mod quote;

pub use builder::SqlBuilder;
pub use changes::{
    changes_page_query, changes_query_for_table, changes_union_query,
    db_version_union_query, row_patch_data_query, P_AFTER_CID, P_AFTER_PKS,
    P_AFTER_TBL, P_AFTER_VRSN, P_EXCLUDE_SITE, P_PAGE_SIZE, P_SITE, P_VERSION,
};
pub use quote::{quote_ident, quote_text_literal, split_pk_literals, PK_SEPARATOR};
