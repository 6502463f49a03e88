#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Tabular storage for the crash-weather pipeline.
//!
//! Stages exchange whole [`DataFrame`]s through the [`TableStore`] trait.
//! Two implementations are provided: [`DuckDbStore`] persists tables in a
//! single `DuckDB` file, and [`MemoryStore`] keeps them in a map for tests
//! and dry runs.

pub mod duck;
pub mod memory;
pub mod paths;

use chrono::{DateTime, Utc};
use polars::prelude::{DataFrame, PolarsError};

pub use duck::DuckDbStore;
pub use memory::MemoryStore;

/// Errors that can occur while reading or writing stored tables.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested table does not exist.
    #[error("Table not found: {name}")]
    TableNotFound {
        /// Name of the missing table.
        name: String,
    },

    /// A table without columns cannot be persisted.
    #[error("Table '{name}' has no columns")]
    EmptySchema {
        /// Name of the table being written.
        name: String,
    },

    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be converted to or from stored rows.
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// A named collection of tables.
///
/// Writes replace the whole table and are all-or-nothing: after a failed
/// write the previous contents (or absence) of the table are unchanged.
pub trait TableStore {
    /// Whether a table with this name exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    fn table_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Reads a whole table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TableNotFound`] if the table does not exist.
    fn read_table(&self, name: &str) -> Result<DataFrame, StoreError>;

    /// Creates or replaces a table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptySchema`] for a frame without columns, or
    /// another [`StoreError`] if the write fails. Nothing is persisted in
    /// either case.
    fn write_table(&mut self, name: &str, table: &DataFrame) -> Result<(), StoreError>;

    /// When the table was last written through this store, if known.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    fn last_written(&self, _name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(None)
    }

    /// Row count recorded when the table was last written, if known.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    fn row_count(&self, _name: &str) -> Result<Option<u64>, StoreError> {
        Ok(None)
    }

    /// Names of all user tables, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    fn table_names(&self) -> Result<Vec<String>, StoreError>;
}

/// Rejects frames that have no columns; both stores refuse to persist them.
pub(crate) fn ensure_columns(name: &str, table: &DataFrame) -> Result<(), StoreError> {
    if table.width() == 0 {
        return Err(StoreError::EmptySchema {
            name: name.to_string(),
        });
    }
    Ok(())
}
