//! Copying finished tables out of the working store for the dashboard.

use std::io::Write;
use std::path::Path;

use crash_weather_models::tables;
use crash_weather_store::{StoreError, TableStore};
use polars::io::SerWriter;
use polars::prelude::{CsvWriter, DataFrame, PolarsError};

/// Errors that can occur while exporting tables.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// CSV write error.
    #[error("CSV error: {0}")]
    Polars(#[from] PolarsError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading from or writing to a store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Output format of `crash_weather export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// A separate `DuckDB` file holding the exported tables.
    Duckdb,
    /// One `<table>.csv` file per table in a directory.
    Csv,
}

/// Tables the dashboard reads.
pub const DEFAULT_TABLES: &[&str] = &[tables::WEATHER_CRASH, tables::WEATHER_CRASH_NORMALIZED];

/// Copies each named table from `source` into `target`, replacing any
/// previous copy. Returns the number of rows copied.
///
/// # Errors
///
/// Returns [`ExportError::Store`] if a table is missing or a write fails.
pub fn copy_tables(
    source: &dyn TableStore,
    target: &mut dyn TableStore,
    names: &[&str],
) -> Result<usize, ExportError> {
    let mut rows = 0;
    for name in names {
        let table = source.read_table(name)?;
        target.write_table(name, &table)?;
        log::info!("Exported {name} ({} rows)", table.height());
        rows += table.height();
    }
    Ok(rows)
}

/// Writes a table as comma-separated values with a header row. Nulls are
/// written as empty cells.
///
/// # Errors
///
/// Returns [`ExportError`] if writing fails.
pub fn write_csv<W: Write>(table: &DataFrame, writer: W) -> Result<(), ExportError> {
    CsvWriter::new(writer)
        .include_header(true)
        .finish(&mut table.clone())?;
    Ok(())
}

/// Writes every named table to `<dir>/<table>.csv`.
///
/// # Errors
///
/// Returns [`ExportError`] if a table is missing or a file cannot be written.
pub fn export_csv_dir(
    source: &dyn TableStore,
    names: &[&str],
    dir: &Path,
) -> Result<usize, ExportError> {
    crash_weather_store::paths::ensure_dir(dir)?;

    let mut rows = 0;
    for name in names {
        let table = source.read_table(name)?;
        let path = dir.join(format!("{name}.csv"));
        let file = std::fs::File::create(&path)?;
        write_csv(&table, std::io::BufWriter::new(file))?;
        log::info!("Wrote {} ({} rows)", path.display(), table.height());
        rows += table.height();
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use crash_weather_store::MemoryStore;
    use polars::df;

    use super::*;

    fn final_table() -> DataFrame {
        df!(
            "route_id" => ["A_1", "A_2"],
            "smoothed_crash" => [Some(0.5), None]
        )
        .unwrap()
    }

    #[test]
    fn copies_tables_between_stores() {
        let mut source = MemoryStore::new();
        source
            .write_table(tables::WEATHER_CRASH_NORMALIZED, &final_table())
            .unwrap();
        let mut target = MemoryStore::new();

        let rows = copy_tables(&source, &mut target, &[tables::WEATHER_CRASH_NORMALIZED]).unwrap();

        assert_eq!(rows, 2);
        assert!(
            target
                .read_table(tables::WEATHER_CRASH_NORMALIZED)
                .unwrap()
                .equals_missing(&final_table())
        );
    }

    #[test]
    fn missing_tables_fail_the_export() {
        let source = MemoryStore::new();
        let mut target = MemoryStore::new();
        assert!(matches!(
            copy_tables(&source, &mut target, DEFAULT_TABLES),
            Err(ExportError::Store(StoreError::TableNotFound { .. }))
        ));
    }

    #[test]
    fn csv_output_has_header_and_empty_nulls() {
        let mut out = Vec::new();
        write_csv(&final_table(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "route_id,smoothed_crash\nA_1,0.5\nA_2,\n"
        );
    }
}
