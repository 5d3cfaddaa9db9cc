//! DuckDB-backed table store: CSV import/export, paged reads and cell write-back.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use duckdb::{params, Connection, Row};
use polars::datatypes::TimeUnit;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Location string that opens a database without a backing file.
pub const IN_MEMORY: &str = ":memory:";

/// Field separators offered for import and export.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Semicolon,
    Comma,
    Tab,
    Pipe,
}

impl Delimiter {
    pub const ALL: [Delimiter; 4] = [
        Delimiter::Semicolon,
        Delimiter::Comma,
        Delimiter::Tab,
        Delimiter::Pipe,
    ];

    pub fn as_char(self) -> char {
        match self {
            Delimiter::Semicolon => ';',
            Delimiter::Comma => ',',
            Delimiter::Tab => '\t',
            Delimiter::Pipe => '|',
        }
    }

    /// Localization key for the human readable name.
    pub fn label_key(self) -> &'static str {
        match self {
            Delimiter::Semicolon => "delimiter.semicolon",
            Delimiter::Comma => "delimiter.comma",
            Delimiter::Tab => "delimiter.tab",
            Delimiter::Pipe => "delimiter.pipe",
        }
    }

    /// The next separator in `ALL`, wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|d| *d == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

/// Options passed to DuckDB's CSV sniffer on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: Delimiter,
    pub has_header: bool,
    pub ignore_errors: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Semicolon,
            has_header: true,
            ignore_errors: true,
        }
    }
}

impl CsvOptions {
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }
}

/// How a column is carried into a DataFrame, derived from its declared SQL type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Text,
}

impl ColumnKind {
    pub fn from_sql_type(sql_type: &str) -> Self {
        let upper = sql_type.trim().to_ascii_uppercase();
        match upper.as_str() {
            "TINYINT" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "UTINYINT" | "USMALLINT"
            | "UINTEGER" => ColumnKind::Integer,
            // Wider than i64; carried as floats.
            "HUGEINT" | "UBIGINT" | "UHUGEINT" => ColumnKind::Float,
            "FLOAT" | "REAL" | "DOUBLE" => ColumnKind::Float,
            "BOOLEAN" | "BOOL" => ColumnKind::Boolean,
            "DATE" => ColumnKind::Timestamp,
            _ if upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC") => {
                ColumnKind::Float
            }
            _ if upper.starts_with("TIMESTAMP") => ColumnKind::Timestamp,
            _ => ColumnKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
}

impl ColumnInfo {
    pub fn kind(&self) -> ColumnKind {
        ColumnKind::from_sql_type(&self.sql_type)
    }
}

/// One window of rows, every cell in its text form. `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub columns: Vec<String>,
    pub rowids: Vec<i64>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Page {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }
}

/// A single edited cell addressed by DuckDB `rowid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub rowid: i64,
    pub column: String,
    pub value: Option<String>,
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for interpolation into SQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn require_table_name(table: &str) -> Result<&str> {
    let trimmed = table.trim();
    if trimmed.is_empty() {
        return Err(eyre!("Table name must not be empty"));
    }
    Ok(trimmed)
}

pub(crate) fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count.max(0) as usize)
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
    )?;
    let columns = stmt
        .query_map(params![table], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                sql_type: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(eyre!("Table {} does not exist", quote_ident(table)));
    }
    Ok(columns)
}

/// Single DuckDB connection shared between the UI thread and background tasks.
pub struct Store {
    conn: Mutex<Connection>,
    location: String,
}

impl Store {
    /// Open (or create) a database file. `:memory:` opens a transient database.
    pub fn open(location: &str) -> Result<Self> {
        if location == IN_MEMORY {
            return Self::open_in_memory();
        }
        let conn = Connection::open(location)
            .map_err(|e| eyre!("Failed to open database {}: {}", location, e))?;
        tracing::info!(location, "opened database");
        Ok(Self {
            conn: Mutex::new(conn),
            location: location.to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: IN_MEMORY.to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| eyre!("Database connection lock poisoned"))
    }

    /// Run `f` inside a transaction; it is committed only if `f` succeeds.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&duckdb::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Create or replace `table` from a CSV file and return its row count.
    pub fn import_csv(&self, path: &Path, table: &str, opts: &CsvOptions) -> Result<usize> {
        let table = require_table_name(table)?;
        if !path.exists() {
            return Err(eyre!("File not found: {}", path.display()));
        }
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_csv_auto({}, header={}, delim={}, ignore_errors={}, sample_size=-1)",
            quote_ident(table),
            quote_literal(&path.to_string_lossy()),
            opts.has_header,
            quote_literal(&opts.delimiter.as_char().to_string()),
            opts.ignore_errors,
        );
        let conn = self.lock()?;
        conn.execute_batch(&sql)?;
        let rows = count_rows(&conn, table)?;
        tracing::info!(table, rows, path = %path.display(), "imported csv");
        Ok(rows)
    }

    pub fn table_count(&self, table: &str) -> Result<usize> {
        let table = require_table_name(table)?;
        let conn = self.lock()?;
        count_rows(&conn, table)
    }

    pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let table = require_table_name(table)?;
        let conn = self.lock()?;
        table_columns(&conn, table)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.list_tables()?.iter().any(|t| t == table.trim()))
    }

    /// Names of all base tables in the main schema.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' AND table_type = 'BASE TABLE' ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Read up to `limit` rows starting at `offset`, ordered by `rowid`.
    pub fn page(&self, table: &str, offset: usize, limit: usize) -> Result<Page> {
        let table = require_table_name(table)?;
        let conn = self.lock()?;
        let columns = table_columns(&conn, table)?;
        let select_list = columns
            .iter()
            .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(&c.name)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT rowid, {} FROM {} ORDER BY rowid LIMIT {} OFFSET {}",
            select_list,
            quote_ident(table),
            limit,
            offset
        );
        let width = columns.len();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut page = Page {
            offset,
            columns: columns.into_iter().map(|c| c.name).collect(),
            rowids: Vec::new(),
            rows: Vec::new(),
        };
        while let Some(row) = rows.next()? {
            page.rowids.push(row.get::<_, i64>(0)?);
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(row.get::<_, Option<String>>(i + 1)?);
            }
            page.rows.push(cells);
        }
        Ok(page)
    }

    /// Load the whole table into a DataFrame, typed by each column's declared SQL type.
    pub fn fetch_frame(&self, table: &str) -> Result<DataFrame> {
        let table = require_table_name(table)?;
        let conn = self.lock()?;
        let columns = table_columns(&conn, table)?;
        let select_list = columns
            .iter()
            .map(|c| {
                let ident = quote_ident(&c.name);
                match c.kind() {
                    ColumnKind::Integer => format!("CAST({} AS BIGINT)", ident),
                    ColumnKind::Float => format!("CAST({} AS DOUBLE)", ident),
                    ColumnKind::Boolean => ident,
                    ColumnKind::Timestamp => format!("epoch_ms(CAST({} AS TIMESTAMP))", ident),
                    ColumnKind::Text => format!("CAST({} AS VARCHAR)", ident),
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            select_list,
            quote_ident(table)
        );

        let mut buffers: Vec<ColumnBuffer> = columns
            .iter()
            .map(|c| ColumnBuffer::for_kind(c.kind()))
            .collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(row, i)?;
            }
        }

        let mut series_vec = Vec::with_capacity(columns.len());
        for (info, buffer) in columns.iter().zip(buffers) {
            series_vec.push(buffer.into_series(&info.name)?.into());
        }
        Ok(DataFrame::new(series_vec)?)
    }

    /// Write the result of `sql` to a CSV file with a header row.
    pub fn export_query_to_csv(&self, sql: &str, path: &Path, delimiter: Delimiter) -> Result<()> {
        let copy = format!(
            "COPY ({}) TO {} (DELIMITER {}, HEADER TRUE)",
            sql,
            quote_literal(&path.to_string_lossy()),
            quote_literal(&delimiter.as_char().to_string()),
        );
        let conn = self.lock()?;
        conn.execute_batch(&copy)?;
        Ok(())
    }

    /// Export the whole table in `rowid` order and return the number of rows written.
    pub fn export_table(&self, table: &str, path: &Path, delimiter: Delimiter) -> Result<usize> {
        let table = require_table_name(table)?;
        let rows = self.table_count(table)?;
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table));
        self.export_query_to_csv(&sql, path, delimiter)?;
        tracing::info!(table, rows, path = %path.display(), "exported csv");
        Ok(rows)
    }

    /// Apply cell edits in one transaction, casting text back to each column's type.
    pub fn update_cells(&self, table: &str, updates: &[CellUpdate]) -> Result<usize> {
        let table = require_table_name(table)?;
        if updates.is_empty() {
            return Ok(0);
        }
        let count = self.with_transaction(|tx| {
            let types: HashMap<String, String> = table_columns(tx, table)?
                .into_iter()
                .map(|c| (c.name, c.sql_type))
                .collect();
            for update in updates {
                let sql_type = types.get(&update.column).ok_or_else(|| {
                    eyre!("Column {} not found in {}", update.column, table)
                })?;
                let sql = format!(
                    "UPDATE {} SET {} = CAST(? AS {}) WHERE rowid = ?",
                    quote_ident(table),
                    quote_ident(&update.column),
                    sql_type
                );
                tx.execute(&sql, params![update.value, update.rowid])
                    .map_err(|e| {
                        eyre!(
                            "Cannot store {:?} in column {}: {}",
                            update.value.as_deref().unwrap_or(""),
                            update.column,
                            e
                        )
                    })?;
            }
            Ok(updates.len())
        })?;
        tracing::info!(table, cells = count, "saved edits");
        Ok(count)
    }

    /// Merge the leading date and time columns into one timestamp column.
    pub fn reformat_datetime(
        &self,
        table: &str,
        opts: &crate::normalize::NormalizeOptions,
    ) -> Result<usize> {
        crate::normalize::reformat_table(self, table, opts)
    }
}

enum ColumnBuffer {
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Timestamp(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuffer {
    fn for_kind(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Integer => ColumnBuffer::Integer(Vec::new()),
            ColumnKind::Float => ColumnBuffer::Float(Vec::new()),
            ColumnKind::Boolean => ColumnBuffer::Boolean(Vec::new()),
            ColumnKind::Timestamp => ColumnBuffer::Timestamp(Vec::new()),
            ColumnKind::Text => ColumnBuffer::Text(Vec::new()),
        }
    }

    fn push(&mut self, row: &Row<'_>, idx: usize) -> Result<()> {
        match self {
            ColumnBuffer::Integer(v) | ColumnBuffer::Timestamp(v) => v.push(row.get(idx)?),
            ColumnBuffer::Float(v) => v.push(row.get(idx)?),
            ColumnBuffer::Boolean(v) => v.push(row.get(idx)?),
            ColumnBuffer::Text(v) => v.push(row.get(idx)?),
        }
        Ok(())
    }

    fn into_series(self, name: &str) -> Result<Series> {
        let series = match self {
            ColumnBuffer::Integer(v) => Series::new(name.into(), v),
            ColumnBuffer::Float(v) => Series::new(name.into(), v),
            ColumnBuffer::Boolean(v) => Series::new(name.into(), v),
            ColumnBuffer::Text(v) => Series::new(name.into(), v),
            ColumnBuffer::Timestamp(v) => Series::new(name.into(), v)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        };
        Ok(series)
    }
}
