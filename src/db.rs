use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use sha2::{Digest, Sha256};
use tracing::{error, info};

/// Column holding a fingerprint of the row's values; its UNIQUE constraint
/// makes re-loading the same rows a no-op.
pub const ROW_KEY: &str = "_row_key";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Double-quoted identifier; keeps case and spaces of CSV headers.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// SQL type for a column, judged from one sample value.
pub fn column_type(sample: &Value, max_text_len: usize) -> String {
    match sample {
        Value::Integer(_) => "INTEGER".to_string(),
        Value::Real(_) => "NUMERIC".to_string(),
        Value::Text(_) => format!("VARCHAR({})", max_text_len),
        _ => "TEXT".to_string(),
    }
}

/// Create `table` from a sample row unless it already exists. Returns whether it was created.
pub fn ensure_table(
    conn: &Connection,
    table: &str,
    header: &[String],
    sample: &[Value],
    max_text_len: usize,
) -> Result<bool> {
    if table_exists(conn, table)? {
        info!("Table {} already exists.", table);
        return Ok(false);
    }

    check_header(header)?;

    let mut columns = vec!["id INTEGER PRIMARY KEY".to_string()];
    for (name, value) in header.iter().zip(sample) {
        columns.push(format!("{} {}", quote_ident(name), column_type(value, max_text_len)));
    }
    columns.push(format!("{} TEXT NOT NULL UNIQUE", quote_ident(ROW_KEY)));

    let sql = format!("CREATE TABLE {} (\n    {}\n)", quote_ident(table), columns.join(",\n    "));
    conn.execute_batch(&sql)
        .with_context(|| format!("Failed to create table {}", table))?;
    info!("Table {} created.", table);
    Ok(true)
}

/// Header names must not collide with each other or with the columns we add.
/// SQLite compares identifiers case-insensitively.
fn check_header(header: &[String]) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in header {
        let folded = name.to_lowercase();
        if folded == "id" || folded == ROW_KEY {
            bail!(
                "CSV column {:?} clashes with the reserved column {:?}; rename it in the header",
                name,
                if folded == "id" { "id" } else { ROW_KEY }
            );
        }
        if let Some(first) = seen.insert(folded, name) {
            bail!("CSV header repeats column {:?} (also {:?})", name, first);
        }
    }
    Ok(())
}

/// Stable fingerprint of the `occurrence`-th copy (0-based) of a row within one input.
pub fn row_key(values: &[Value], occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    for v in values {
        match v {
            Value::Null => hasher.update(b"n"),
            Value::Integer(i) => {
                hasher.update(b"i");
                hasher.update(i.to_le_bytes());
            }
            Value::Real(f) => {
                hasher.update(b"r");
                hasher.update(f.to_le_bytes());
            }
            Value::Text(s) => {
                hasher.update(b"t");
                hasher.update((s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            Value::Blob(b) => {
                hasher.update(b"b");
                hasher.update((b.len() as u64).to_le_bytes());
                hasher.update(b);
            }
        }
    }
    hasher.update(b"#");
    hasher.update((occurrence as u64).to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Load stats returned after completion.
#[derive(Debug, Default, PartialEq)]
pub struct LoadStats {
    pub inserted: usize,
    pub duplicates: usize,
    /// Index of the row that stopped the load.
    pub failed_at: Option<usize>,
}

/// Insert rows one at a time, each in its own transaction.
///
/// The first failing row is rolled back, written to `error_log`, and ends the
/// load; later rows are not attempted.
pub fn insert_rows(
    conn: &Connection,
    table: &str,
    header: &[String],
    rows: &[Vec<Value>],
    error_log: &Path,
    pb: &ProgressBar,
) -> Result<LoadStats> {
    let with_key = column_names(conn, table)?.iter().any(|c| c == ROW_KEY);

    let mut cols: Vec<String> = header.iter().map(|h| quote_ident(h)).collect();
    if with_key {
        cols.push(quote_ident(ROW_KEY));
    }
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
        quote_ident(table),
        cols.join(", "),
        placeholders.join(", ")
    );

    // Identical rows in one file are distinct records; number them so each gets its own key.
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut stats = LoadStats::default();
    for (index, row) in rows.iter().enumerate() {
        let key = with_key.then(|| {
            let count = seen.entry(row_key(row, 0)).or_insert(0);
            let key = row_key(row, *count);
            *count += 1;
            Value::Text(key)
        });
        match insert_one(conn, &sql, row.iter().chain(key.iter())) {
            Ok(0) => stats.duplicates += 1,
            Ok(_) => stats.inserted += 1,
            Err(e) => {
                error!("Error inserting row (index {}): {}", index, e);
                append_error(error_log, index, &e.to_string(), row)?;
                stats.failed_at = Some(index);
                break;
            }
        }
        pb.inc(1);
    }
    Ok(stats)
}

fn insert_one<'a>(
    conn: &Connection,
    sql: &str,
    values: impl Iterator<Item = &'a Value>,
) -> rusqlite::Result<usize> {
    // Dropping an uncommitted transaction rolls it back.
    let tx = conn.unchecked_transaction()?;
    let n = tx.execute(sql, params_from_iter(values))?;
    tx.commit()?;
    Ok(n)
}

/// Append `row_index, error_message, row_values` to the error log.
fn append_error(path: &Path, index: usize, message: &str, row: &[Value]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open error log {:?}", path))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    let values: Vec<serde_json::Value> = row.iter().map(value_to_json).collect();
    writer.write_record([
        index.to_string(),
        message.to_string(),
        serde_json::to_string(&values)?,
    ])?;
    writer.flush()?;
    Ok(())
}

fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null | Value::Blob(_) => serde_json::Value::Null,
        Value::Integer(i) => (*i).into(),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => s.clone().into(),
    }
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let n: usize = conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |r| {
        r.get(0)
    })?;
    Ok(n)
}
