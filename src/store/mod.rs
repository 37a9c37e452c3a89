//! Relational store contract.
//!
//! The loader only needs three operations from a store: create a table from
//! a [`TableSpec`], drop a table, and bulk-load a serialized record stream
//! into a table. How a backend speaks SQL or ingests rows stays behind
//! [`TableStore`].
//!
//! Two backends ship with the crate:
//! - [`memory::MemoryStore`]: in-process tables, always available. Handy for
//!   tests and dry runs; supports failure injection.
//! - `sqlite::SqliteStore`: bundled SQLite through `rusqlite` (feature
//!   `sqlite-store`).

use crate::infer::{ColumnType, TableSpec};
use std::io::{self, Read};
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    /// `create_table` found a table of that name; raised atomically by the store.
    #[error("table '{0}' already exists")]
    AlreadyExists(String),

    #[error("table '{0}' does not exist")]
    NotFound(String),

    #[error("bulk load into '{table}' failed: {message}")]
    Load { table: String, message: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Wire layout of the record stream handed to [`TableStore::bulk_load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyFormat {
    pub delimiter: u8,
    pub quote: u8,
    /// Field text that stands for NULL.
    pub null: String,
    pub has_header: bool,
}

impl Default for CopyFormat {
    /// CSV without a header row; an empty field is NULL.
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            null: String::new(),
            has_header: false,
        }
    }
}

impl CopyFormat {
    /// CSV reader matching this layout.
    pub fn reader<R: Read>(&self, data: R) -> csv::Reader<R> {
        csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .has_headers(self.has_header)
            .flexible(true)
            .from_reader(data)
    }

    /// Interpret one field, mapping the null marker to `None`.
    pub fn field<'a>(&self, raw: &'a str) -> Option<&'a str> {
        (raw != self.null).then_some(raw)
    }
}

/// Narrow contract the loader drives a relational store through.
pub trait TableStore: Send + Sync {
    /// Create `spec.name` with the spec's columns.
    ///
    /// Must fail with [`StoreError::AlreadyExists`] when the table exists,
    /// decided atomically by the store rather than by a separate lookup.
    fn create_table(&self, spec: &TableSpec) -> StoreResult<()>;

    /// Drop a table; dropping a missing table succeeds.
    fn drop_table(&self, name: &str) -> StoreResult<()>;

    /// Read `data` to its end and ingest every record into `table`.
    ///
    /// `columns` names the target columns in stream field order. Returns the
    /// number of rows inserted. Either every row of the stream is committed
    /// or none is.
    fn bulk_load(
        &self,
        table: &str,
        columns: &[String],
        data: &mut dyn Read,
        format: &CopyFormat,
    ) -> StoreResult<u64>;
}

impl<T: TableStore + ?Sized> TableStore for Arc<T> {
    fn create_table(&self, spec: &TableSpec) -> StoreResult<()> {
        (**self).create_table(spec)
    }

    fn drop_table(&self, name: &str) -> StoreResult<()> {
        (**self).drop_table(name)
    }

    fn bulk_load(
        &self,
        table: &str,
        columns: &[String],
        data: &mut dyn Read,
        format: &CopyFormat,
    ) -> StoreResult<u64> {
        (**self).bulk_load(table, columns, data, format)
    }
}

impl<T: TableStore + ?Sized> TableStore for &T {
    fn create_table(&self, spec: &TableSpec) -> StoreResult<()> {
        (**self).create_table(spec)
    }

    fn drop_table(&self, name: &str) -> StoreResult<()> {
        (**self).drop_table(name)
    }

    fn bulk_load(
        &self,
        table: &str,
        columns: &[String],
        data: &mut dyn Read,
        format: &CopyFormat,
    ) -> StoreResult<u64> {
        (**self).bulk_load(table, columns, data, format)
    }
}

/// Double-quote an identifier for SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` statement for `spec`, with a per-backend type mapping.
pub fn create_table_sql(spec: &TableSpec, sql_type: impl Fn(ColumnType) -> &'static str) -> String {
    let columns: Vec<String> = spec
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), sql_type(c.ty)))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(&spec.name),
        columns.join(", ")
    )
}
