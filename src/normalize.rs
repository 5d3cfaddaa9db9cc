//! Merge a split date/time column pair into a single timestamp column.

use crate::store::{count_rows, quote_ident, table_columns, Store};
use chrono::NaiveDateTime;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Literal prefix stripped from the date column.
    pub date_prefix: String,
    /// Literal prefix stripped from the time column.
    pub time_prefix: String,
    pub input_format: String,
    pub output_format: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            date_prefix: "D#".to_string(),
            time_prefix: "TOD#".to_string(),
            input_format: "%Y-%m-%d %H:%M:%S%.f".to_string(),
            output_format: "%d/%m/%Y %H:%M:%S%.3f".to_string(),
        }
    }
}

fn strip_prefix<'a>(value: &'a str, prefix: &str) -> &'a str {
    let value = value.trim();
    if prefix.is_empty() {
        return value;
    }
    value.strip_prefix(prefix).unwrap_or(value).trim()
}

/// Combine one date cell and one time cell. Unparseable input yields `None`.
pub fn combine_date_time(
    date: Option<&str>,
    time: Option<&str>,
    opts: &NormalizeOptions,
) -> Option<String> {
    let date = strip_prefix(date?, &opts.date_prefix);
    let time = strip_prefix(time?, &opts.time_prefix);
    let joined = format!("{} {}", date, time);
    NaiveDateTime::parse_from_str(&joined, &opts.input_format)
        .ok()
        .map(|dt| dt.format(&opts.output_format).to_string())
}

/// First `{table}__reformat{n}` name not taken by any table or view.
fn staging_name(conn: &Connection, table: &str) -> Result<String> {
    let mut stmt = conn.prepare("SELECT table_name FROM information_schema.tables")?;
    let taken = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    let base = format!("{}__reformat", table);
    let mut name = base.clone();
    let mut n = 1;
    while taken.contains(&name) {
        name = format!("{}{}", base, n);
        n += 1;
    }
    Ok(name)
}

/// Rewrite `table` so its first column holds the combined timestamp text and its
/// second column is gone. Returns the number of rows that parsed.
///
/// The rebuilt table is swapped in within one transaction; on any failure the
/// original table is left as it was.
pub fn reformat_table(store: &Store, table: &str, opts: &NormalizeOptions) -> Result<usize> {
    let table = table.trim();
    if table.is_empty() {
        return Err(eyre!("Table name must not be empty"));
    }

    let parsed = store.with_transaction(|tx| {
        let columns = table_columns(tx, table)?;
        if columns.len() < 2 {
            return Err(eyre!(
                "Reformatting needs at least two columns (date and time), {} has {}",
                table,
                columns.len()
            ));
        }
        if count_rows(tx, table)? == 0 {
            return Ok(0);
        }

        let date_col = quote_ident(&columns[0].name);
        let time_col = quote_ident(&columns[1].name);
        let source = quote_ident(table);
        let staging_table = staging_name(tx, table)?;
        let staging = quote_ident(&staging_table);

        tx.execute_batch(&format!(
            "CREATE TABLE {} (src_rowid BIGINT, ts VARCHAR)",
            staging
        ))?;

        let mut combined: Vec<(i64, Option<String>)> = Vec::new();
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT rowid, CAST({} AS VARCHAR), CAST({} AS VARCHAR) FROM {}",
                date_col, time_col, source
            ))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let rowid: i64 = row.get(0)?;
                let date: Option<String> = row.get(1)?;
                let time: Option<String> = row.get(2)?;
                combined.push((
                    rowid,
                    combine_date_time(date.as_deref(), time.as_deref(), opts),
                ));
            }
        }
        let parsed = combined.iter().filter(|(_, ts)| ts.is_some()).count();

        {
            let mut appender = tx.appender(&staging_table)?;
            for (rowid, ts) in &combined {
                appender.append_row(params![*rowid, ts.as_deref()])?;
            }
            appender.flush()?;
        }

        let rest = columns[2..]
            .iter()
            .map(|c| format!(", t.{}", quote_ident(&c.name)))
            .collect::<String>();
        tx.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {source} AS \
             SELECT s.ts AS {date_col}{rest} FROM {source} t \
             JOIN {staging} s ON s.src_rowid = t.rowid ORDER BY t.rowid; \
             DROP TABLE {staging};"
        ))?;
        Ok(parsed)
    })?;

    tracing::info!(table, parsed, "reformatted date/time columns");
    Ok(parsed)
}
