//! `DuckDB`-backed [`TableStore`].
//!
//! Every pipeline table lives in one `DuckDB` file. A `_meta` table records
//! when each table was last written and how many rows it held; it is
//! updated in the same transaction that replaces the table, so a table and
//! its metadata row always agree.

use std::path::Path;

use chrono::{DateTime, Utc};
use duckdb::Connection;
use duckdb::types::Value as SqlValue;
use polars::prelude::{Column, DataFrame, DataType, NamedFrom};

use crate::{StoreError, TableStore};

/// Name of the bookkeeping table.
pub const META_TABLE: &str = "_meta";

/// Number of rows per INSERT statement.
const CHUNK_ROWS: usize = 1_000;

/// A [`TableStore`] persisted in a `DuckDB` database.
pub struct DuckDbStore {
    conn: Connection,
}

impl DuckDbStore {
    /// Opens (or creates) a store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the directory, connection or metadata
    /// table cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        log::debug!("Opened table store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Opens a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _meta (
                table_name TEXT PRIMARY KEY,
                written_at TEXT NOT NULL,
                row_count BIGINT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    /// Underlying connection, for ad-hoc queries.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn meta_row_count(&self, name: &str) -> Result<Option<u64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT row_count FROM _meta WHERE table_name = ?")?;
        match stmt.query_row([name], |row| row.get::<_, i64>(0)) {
            Ok(count) => Ok(Some(u64::try_from(count).unwrap_or(0))),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::DuckDb(e)),
        }
    }

    fn schema(&self, name: &str) -> Result<Vec<(String, SqlKind)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name, data_type FROM information_schema.columns
             WHERE table_schema = 'main' AND table_name = ?
             ORDER BY ordinal_position",
        )?;
        let mut rows = stmt.query([name])?;
        let mut schema = Vec::new();
        while let Some(row) = rows.next()? {
            let column: String = row.get(0)?;
            let data_type: String = row.get(1)?;
            schema.push((column, SqlKind::from_sql_type(&data_type)));
        }
        Ok(schema)
    }
}

/// Storage type of one column, as written to and read back from `DuckDB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqlKind {
    Bool,
    Int,
    Float,
    Text,
}

impl SqlKind {
    const fn sql_type(self) -> &'static str {
        match self {
            Self::Bool => "BOOLEAN",
            Self::Int => "BIGINT",
            Self::Float => "DOUBLE",
            Self::Text => "VARCHAR",
        }
    }

    /// Maps a `DuckDB` type name onto the kind it is read back as. Anything
    /// that is not boolean or numeric is read as text.
    fn from_sql_type(data_type: &str) -> Self {
        let upper = data_type.to_ascii_uppercase();
        match upper.as_str() {
            "BOOLEAN" => Self::Bool,
            "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" | "UTINYINT" | "USMALLINT"
            | "UINTEGER" => Self::Int,
            "FLOAT" | "REAL" | "DOUBLE" => Self::Float,
            _ if upper.starts_with("DECIMAL") => Self::Float,
            _ => Self::Text,
        }
    }

    fn for_dtype(dtype: &DataType) -> Self {
        if dtype == &DataType::Boolean {
            Self::Bool
        } else if dtype.is_integer() {
            Self::Int
        } else if dtype.is_float() {
            Self::Float
        } else {
            Self::Text
        }
    }
}

/// Values of one column collected row by row while reading.
enum Buffer {
    Bool(Vec<Option<bool>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Buffer {
    const fn new(kind: SqlKind) -> Self {
        match kind {
            SqlKind::Bool => Self::Bool(Vec::new()),
            SqlKind::Int => Self::Int(Vec::new()),
            SqlKind::Float => Self::Float(Vec::new()),
            SqlKind::Text => Self::Text(Vec::new()),
        }
    }

    fn push(&mut self, row: &duckdb::Row<'_>, index: usize) -> duckdb::Result<()> {
        match self {
            Self::Bool(values) => values.push(row.get(index)?),
            Self::Int(values) => values.push(row.get(index)?),
            Self::Float(values) => values.push(row.get(index)?),
            Self::Text(values) => values.push(row.get(index)?),
        }
        Ok(())
    }

    fn into_column(self, name: &str) -> Column {
        match self {
            Self::Bool(values) => Column::new(name.into(), values),
            Self::Int(values) => Column::new(name.into(), values),
            Self::Float(values) => Column::new(name.into(), values),
            Self::Text(values) => Column::new(name.into(), values),
        }
    }
}

/// Converts a frame column into SQL parameters of its storage kind.
fn sql_values(column: &Column) -> Result<(SqlKind, Vec<SqlValue>), StoreError> {
    let kind = SqlKind::for_dtype(column.dtype());
    let values = match kind {
        SqlKind::Bool => column
            .bool()?
            .into_iter()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Boolean))
            .collect(),
        SqlKind::Int => column
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::BigInt))
            .collect(),
        SqlKind::Float => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Double))
            .collect(),
        SqlKind::Text => column
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string())))
            .collect(),
    };
    Ok((kind, values))
}

/// Quotes an identifier for interpolation into SQL.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn parse_written_at(s: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            log::warn!("Failed to parse write timestamp {s:?}: {e}");
            None
        }
    }
}

impl TableStore for DuckDbStore {
    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = 'main' AND table_name = ?",
        )?;
        let count: i64 = stmt.query_row([name], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn read_table(&self, name: &str) -> Result<DataFrame, StoreError> {
        let schema = self.schema(name)?;
        if schema.is_empty() {
            return Err(StoreError::TableNotFound {
                name: name.to_string(),
            });
        }

        let select_list = schema
            .iter()
            .map(|(column, kind)| format!("CAST({} AS {})", quote_ident(column), kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {select_list} FROM {}", quote_ident(name));

        let mut buffers: Vec<Buffer> = schema.iter().map(|(_, kind)| Buffer::new(*kind)).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            for (i, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(row, i)?;
            }
        }

        let columns = schema
            .iter()
            .zip(buffers)
            .map(|((column, _), buffer)| buffer.into_column(column))
            .collect();

        Ok(DataFrame::new(columns)?)
    }

    fn write_table(&mut self, name: &str, table: &DataFrame) -> Result<(), StoreError> {
        crate::ensure_columns(name, table)?;

        let mut column_defs = Vec::with_capacity(table.width());
        let mut columns = Vec::with_capacity(table.width());
        for column in table.get_columns() {
            let (kind, values) = sql_values(column)?;
            column_defs.push(format!("{} {}", quote_ident(column.name()), kind.sql_type()));
            columns.push(values);
        }

        let ident = quote_ident(name);
        let row_placeholder = format!("({})", vec!["?"; columns.len()].join(", "));

        // Dropping the transaction without commit rolls everything back.
        let tx = self.conn.transaction()?;

        tx.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {ident} ({});",
            column_defs.join(", ")
        ))?;

        let row_count = table.height();
        let mut start = 0;
        while start < row_count {
            let end = (start + CHUNK_ROWS).min(row_count);
            let sql = format!(
                "INSERT INTO {ident} VALUES {}",
                vec![row_placeholder.as_str(); end - start].join(", ")
            );
            let columns = &columns;
            let params = (start..end).flat_map(|row| columns.iter().map(move |c| &c[row]));
            let mut stmt = tx.prepare(&sql)?;
            stmt.execute(duckdb::params_from_iter(params))?;
            start = end;
        }

        tx.execute(
            "INSERT INTO _meta (table_name, written_at, row_count) VALUES (?, ?, ?)
             ON CONFLICT (table_name) DO UPDATE SET
                written_at = EXCLUDED.written_at,
                row_count = EXCLUDED.row_count",
            duckdb::params![
                name,
                Utc::now().to_rfc3339(),
                i64::try_from(row_count).unwrap_or(i64::MAX)
            ],
        )?;

        tx.commit()?;

        log::debug!("Wrote table {name} ({row_count} rows)");
        Ok(())
    }

    fn row_count(&self, name: &str) -> Result<Option<u64>, StoreError> {
        self.meta_row_count(name)
    }

    fn last_written(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT written_at FROM _meta WHERE table_name = ?")?;
        match stmt.query_row([name], |row| row.get::<_, String>(0)) {
            Ok(v) => Ok(parse_written_at(&v)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::DuckDb(e)),
        }
    }

    fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = 'main' AND table_name <> ?
             ORDER BY table_name",
        )?;
        let mut rows = stmt.query([META_TABLE])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }
}
