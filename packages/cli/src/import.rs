//! Loading raw CSV exports into the store.
//!
//! The weather export is `;`-separated with `.` decimals; the yearly
//! crash atlas files are `;`-separated with decimal commas. Column types
//! are inferred by polars over the whole file, and empty cells become
//! nulls.

use std::io::{Cursor, Read};
use std::path::Path;

use crash_weather_store::{StoreError, TableStore};
use polars::io::SerReader;
use polars::prelude::*;

const BYTE_ORDER_MARK: &[u8] = b"\xEF\xBB\xBF";

/// Errors that can occur while importing a CSV file.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The CSV could not be parsed.
    #[error("CSV error: {0}")]
    Polars(#[from] PolarsError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing the imported table failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The file has no header row.
    #[error("{path}: no header row")]
    NoHeader {
        /// File being imported.
        path: String,
    },
}

/// How a source file is delimited and how it writes decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub decimal_comma: bool,
}

impl CsvFormat {
    /// Weather observations: `;`-separated, `.` decimals.
    pub const WEATHER: Self = Self {
        delimiter: b';',
        decimal_comma: false,
    };

    /// Accident atlas exports: `;`-separated, `,` decimals.
    pub const CRASH: Self = Self {
        delimiter: b';',
        decimal_comma: true,
    };
}

/// Parses a CSV stream into a [`DataFrame`], inferring column types.
///
/// Rows with more cells than the header are truncated; header names are
/// trimmed.
///
/// # Errors
///
/// Returns [`ImportError`] if the stream cannot be read, has no header, or
/// is malformed.
pub fn read_table<R: Read>(mut reader: R, format: CsvFormat) -> Result<DataFrame, ImportError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.starts_with(BYTE_ORDER_MARK) {
        bytes.drain(..BYTE_ORDER_MARK.len());
    }

    let header = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    if header.iter().all(u8::is_ascii_whitespace) {
        return Err(ImportError::NoHeader {
            path: "<input>".to_string(),
        });
    }

    let mut table = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|po| {
            po.with_separator(format.delimiter)
                .with_decimal_comma(format.decimal_comma)
                .with_truncate_ragged_lines(true)
        })
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;

    let trimmed: Vec<String> = table
        .get_column_names()
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    table.set_column_names(trimmed)?;

    Ok(table)
}

/// Imports `path` into the store as `name`.
///
/// An existing table is left untouched unless `force` is set; returns
/// whether the table was written.
///
/// # Errors
///
/// Returns [`ImportError`] if the file cannot be read or parsed, or the
/// store write fails.
pub fn import_file(
    store: &mut dyn TableStore,
    name: &str,
    path: &Path,
    format: CsvFormat,
    force: bool,
) -> Result<bool, ImportError> {
    if !force && store.table_exists(name)? {
        log::info!("{name} already imported, skipping {}", path.display());
        return Ok(false);
    }

    log::info!("Importing {} into {name}...", path.display());
    let file = std::fs::File::open(path)?;
    let table = read_table(std::io::BufReader::new(file), format).map_err(|e| match e {
        ImportError::NoHeader { .. } => ImportError::NoHeader {
            path: path.display().to_string(),
        },
        other => other,
    })?;

    store.write_table(name, &table)?;
    log::info!(
        "Imported {} rows x {} columns into {name}",
        table.height(),
        table.width()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crash_weather_store::MemoryStore;

    use super::*;

    fn dtypes(table: &DataFrame) -> Vec<DataType> {
        table.dtypes()
    }

    fn names(table: &DataFrame) -> Vec<String> {
        table
            .get_column_names()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn infers_int_float_and_text_columns() {
        let csv = "Strecke;Lat [°];Wind;Station\n\
                   Route_1;48.1;3;A\n\
                   Route_1;48.2;4.5;\n\
                   Route_2;48.3;;B\n";

        let table = read_table(csv.as_bytes(), CsvFormat::WEATHER).unwrap();

        assert_eq!(names(&table), vec!["Strecke", "Lat [°]", "Wind", "Station"]);
        assert_eq!(
            dtypes(&table),
            vec![
                DataType::String,
                DataType::Float64,
                DataType::Float64,
                DataType::String
            ]
        );

        let wind = table.column("Wind").unwrap().f64().unwrap();
        assert_eq!(wind.get(0), Some(3.0));
        assert_eq!(wind.get(2), None);
        assert_eq!(table.column("Station").unwrap().str().unwrap().get(1), None);
    }

    #[test]
    fn decimal_commas_are_read_as_floats() {
        let csv = "UJAHR;XGCSWGS84;STRZUSTAND\n2018;11,58;0\n2018;11,6;1\n";

        let table = read_table(csv.as_bytes(), CsvFormat::CRASH).unwrap();

        assert_eq!(
            dtypes(&table),
            vec![DataType::Int64, DataType::Float64, DataType::Int64]
        );
        assert_eq!(
            table.column("XGCSWGS84").unwrap().f64().unwrap().get(0),
            Some(11.58)
        );

        let plain = read_table(csv.as_bytes(), CsvFormat::WEATHER).unwrap();
        assert_eq!(plain.column("XGCSWGS84").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn empty_cells_become_nulls() {
        let csv = "a;b;c\n1;;\n2;;\n";

        let table = read_table(csv.as_bytes(), CsvFormat::WEATHER).unwrap();

        assert_eq!(table.height(), 2);
        assert_eq!(table.column("b").unwrap().null_count(), 2);
        assert_eq!(table.column("c").unwrap().null_count(), 2);
    }

    #[test]
    fn long_rows_are_truncated() {
        let csv = "a;b\n1;2;3\n4;5\n";

        let table = read_table(csv.as_bytes(), CsvFormat::WEATHER).unwrap();

        assert_eq!(table.width(), 2);
        assert_eq!(table.height(), 2);
    }

    #[test]
    fn byte_order_mark_and_padding_are_stripped_from_headers() {
        let csv = "\u{feff}OBJECTID; UMONAT \n1;12\n";
        let table = read_table(csv.as_bytes(), CsvFormat::CRASH).unwrap();
        assert_eq!(names(&table), vec!["OBJECTID", "UMONAT"]);
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(
            read_table("".as_bytes(), CsvFormat::WEATHER),
            Err(ImportError::NoHeader { .. })
        ));
    }

    #[test]
    fn existing_tables_are_not_reimported() {
        let mut store = MemoryStore::new();
        let existing = df!("x" => [1i64]).unwrap();
        store.write_table("weather_raw", &existing).unwrap();

        let imported = import_file(
            &mut store,
            "weather_raw",
            Path::new("does/not/exist.csv"),
            CsvFormat::WEATHER,
            false,
        )
        .unwrap();

        assert!(!imported);
        assert_eq!(store.write_count("weather_raw"), 1);
    }

    #[test]
    fn forced_import_of_a_missing_file_fails() {
        let mut store = MemoryStore::new();
        let result = import_file(
            &mut store,
            "weather_raw",
            Path::new("does/not/exist.csv"),
            CsvFormat::WEATHER,
            true,
        );
        assert!(matches!(result, Err(ImportError::Io(_))));
    }
}
