//! Quoting for values interpolated into generated SQL

/// Quote an identifier: `app"user` -> `"app""user"`.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal: `it's` -> `'it''s'`.
///
/// Assumes `standard_conforming_strings = on`, the default since PostgreSQL 9.1,
/// so backslashes need no escaping.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
