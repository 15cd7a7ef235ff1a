//! Quoting and primary-key tuple encoding.
//!
//! Two distinct escapes, never interchangeable: identifiers (table and
//! column names) are wrapped in double quotes, literals in single quotes.
//! Conflating the two is the classic injection hazard in synthesized SQL.

use crate::errors::SqlError;

/// Separator between the per-column literals of a composite primary key.
///
/// A lone single quote cannot occur inside a `quote()`d SQL literal (quotes
/// are doubled there), so the byte sequence `~'~` never collides with
/// literal content. Decoding still has to be quote-aware: a *value* ending
/// in `~` puts a `~` right before a closing quote, which a naive substring
/// split would mistake for a separator.
pub const PK_SEPARATOR: &str = "~'~";

/// The separator written as a SQL string literal, for use in `||` concats.
pub const PK_SEPARATOR_LITERAL: &str = "'~''~'";

/// Escape an identifier for embedding in SQL: `"name"`, doubling any
/// embedded double quote.
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Escape a text value for embedding in SQL: `'value'`, doubling any
/// embedded single quote. Mirrors SQLite's `quote()` for TEXT.
pub fn quote_text_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Decompose a quote-concatenated primary key back into its per-column
/// literals, in the order they were produced.
///
/// Each component is a SQLite `quote()` output: a quoted text literal, a
/// blob literal (`X'..'`), a bare numeric, or `NULL`. Components are scanned
/// literal-by-literal so separators are only recognized *between* literals.
pub fn split_pk_literals(encoded: &str) -> Result<Vec<&str>, SqlError> {
    let malformed = || SqlError::MalformedPrimaryKey {
        encoded: encoded.to_string(),
    };

    let bytes = encoded.as_bytes();
    let mut parts = Vec::new();
    let mut pos = 0;

    loop {
        let start = pos;
        let end = match bytes.get(pos) {
            Some(b'\'') => scan_quoted(bytes, pos).ok_or_else(malformed)?,
            Some(b'X') | Some(b'x') if bytes.get(pos + 1) == Some(&b'\'') => {
                scan_quoted(bytes, pos + 1).ok_or_else(malformed)?
            }
            Some(_) => scan_bare(bytes, pos),
            None => return Err(malformed()),
        };
        parts.push(&encoded[start..end]);
        pos = end;

        if pos == bytes.len() {
            return Ok(parts);
        }
        if !encoded[pos..].starts_with(PK_SEPARATOR) {
            return Err(malformed());
        }
        pos += PK_SEPARATOR.len();
    }
}

/// Scan a single-quoted literal starting at `open`. Returns the index one
/// past the closing quote, honoring doubled-quote escapes.
fn scan_quoted(bytes: &[u8], open: usize) -> Option<usize> {
    debug_assert_eq!(bytes[open], b'\'');
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2; // escaped quote, still inside
            } else {
                return Some(i + 1);
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Scan an unquoted component (numeric or NULL) up to the next separator.
fn scan_bare(bytes: &[u8], start: usize) -> usize {
    let sep = PK_SEPARATOR.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        if bytes[i..].starts_with(sep) {
            return i;
        }
        i += 1;
    }
    bytes.len()
}
