//! In-memory [`TableStore`] used by tests and dry runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;

use crate::{StoreError, TableStore};

#[derive(Debug, Clone)]
struct Entry {
    table: DataFrame,
    written_at: DateTime<Utc>,
    writes: u64,
}

/// A [`TableStore`] backed by a map. Also counts writes per table so tests
/// can assert that a stage did not run again.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Entry>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `name` has been written.
    #[must_use]
    pub fn write_count(&self, name: &str) -> u64 {
        self.tables.get(name).map_or(0, |e| e.writes)
    }

    /// Total number of writes across all tables.
    #[must_use]
    pub fn total_writes(&self) -> u64 {
        self.tables.values().map(|e| e.writes).sum()
    }
}

impl TableStore for MemoryStore {
    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.tables.contains_key(name))
    }

    fn read_table(&self, name: &str) -> Result<DataFrame, StoreError> {
        self.tables
            .get(name)
            .map(|e| e.table.clone())
            .ok_or_else(|| StoreError::TableNotFound {
                name: name.to_string(),
            })
    }

    fn write_table(&mut self, name: &str, table: &DataFrame) -> Result<(), StoreError> {
        crate::ensure_columns(name, table)?;
        let writes = self.write_count(name) + 1;
        self.tables.insert(
            name.to_string(),
            Entry {
                table: table.clone(),
                written_at: Utc::now(),
                writes,
            },
        );
        Ok(())
    }

    fn last_written(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.tables.get(name).map(|e| e.written_at))
    }

    fn row_count(&self, name: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.tables.get(name).map(|e| u64::try_from(e.table.height()).unwrap_or(u64::MAX)))
    }

    fn table_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    #[test]
    fn write_then_read() {
        let mut store = MemoryStore::new();
        let table = df!("x" => [1i64, 2]).unwrap();

        assert!(!store.table_exists("t").unwrap());
        store.write_table("t", &table).unwrap();
        assert!(store.table_exists("t").unwrap());
        assert!(store.read_table("t").unwrap().equals_missing(&table));
        assert_eq!(store.write_count("t"), 1);
        assert_eq!(store.row_count("t").unwrap(), Some(2));
        assert!(store.last_written("t").unwrap().is_some());
        assert_eq!(store.table_names().unwrap(), vec!["t".to_string()]);
    }

    #[test]
    fn missing_table_is_reported() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read_table("nope"),
            Err(StoreError::TableNotFound { name }) if name == "nope"
        ));
        assert_eq!(store.row_count("nope").unwrap(), None);
    }

    #[test]
    fn frame_without_columns_is_rejected() {
        let mut store = MemoryStore::new();

        assert!(matches!(
            store.write_table("t", &DataFrame::empty()),
            Err(StoreError::EmptySchema { name }) if name == "t"
        ));
        assert!(!store.table_exists("t").unwrap());
        assert_eq!(store.total_writes(), 0);
    }
}
