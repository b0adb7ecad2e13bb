//! SQL execution against the local server
//!
//! - Identifier and literal quoting for generated scripts
//! - The [`SqlExecutor`] seam and its psql-backed implementation

mod client;
mod quote;

pub use client::{PsqlClient, SqlExecutor, MAINTENANCE_DB};
pub use quote::{quote_ident, quote_literal};
