//! Owned, growable SQL text assembly.
//!
//! The builder is exclusively owned by the synthesis call that created it;
//! `finish` transfers ownership of the text to the caller.

use super::quote::{quote_ident, quote_text_literal};

/// Accumulates SQL fragments into one owned string.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    buf: String,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.buf.push_str(fragment);
        self
    }

    /// Append an escaped identifier.
    pub fn push_ident(&mut self, name: &str) -> &mut Self {
        self.buf.push_str(&quote_ident(name));
        self
    }

    /// Append an escaped text literal.
    pub fn push_literal(&mut self, value: &str) -> &mut Self {
        self.buf.push_str(&quote_text_literal(value));
        self
    }

    /// Append `items` separated by `sep`, rendering each through `render`.
    pub fn push_joined<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &str,
        mut render: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        let mut first = true;
        for item in items {
            if !first {
                self.buf.push_str(sep);
            }
            first = false;
            render(self, item);
        }
        self
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_separator() {
        let mut b = SqlBuilder::new();
        b.push("SELECT ").push_joined(["a", "b", "c"], ", ", |b, col| {
            b.push_ident(col);
        });
        assert_eq!(b.finish(), "SELECT \"a\", \"b\", \"c\"");
    }

    #[test]
    fn distinguishes_identifiers_from_literals() {
        let mut b = SqlBuilder::new();
        b.push_ident("tbl").push(" = ").push_literal("tbl");
        assert_eq!(b.finish(), "\"tbl\" = 'tbl'");
    }
}
