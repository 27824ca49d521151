use std::path::Path;

use anyhow::{Context, Result};
use csv::ByteRecord;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::info;

use crate::db::{self, LoadStats};
use crate::sanitize::Sanitizer;
use crate::sources::LoadConfig;

/// What a load did, for the summary line.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub rows_read: usize,
    pub table_created: bool,
    pub stats: LoadStats,
}

/// Header and raw records of a CSV file. Cells stay bytes until sanitized.
pub fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<ByteRecord>)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;
    let header = reader
        .byte_headers()
        .with_context(|| format!("Failed to read header of {:?}", path))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();
    let records = reader
        .byte_records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read {:?}", path))?;
    Ok((header, records))
}

/// Sanitize every row of `csv_path` and insert it into `cfg.table`.
///
/// The table is created from the first sanitized row if it does not exist.
/// A file with no data rows leaves the database untouched.
pub fn load_csv(
    conn: &Connection,
    csv_path: &Path,
    cfg: &LoadConfig,
    max_text_len: usize,
    error_log: &Path,
) -> Result<LoadReport> {
    let (header, records) = read_csv(csv_path)?;
    let sanitizer = Sanitizer::new(&cfg.numeric, &cfg.shorthand, max_text_len);

    let rows: Vec<_> = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let cells: Vec<Option<&[u8]>> = record.iter().map(Some).collect();
            sanitizer.sanitize(index, &header, &cells)
        })
        .collect();

    let mut report = LoadReport {
        rows_read: rows.len(),
        ..LoadReport::default()
    };
    let Some(sample) = rows.first() else {
        info!("No data in {:?}", csv_path);
        return Ok(report);
    };

    report.table_created = db::ensure_table(conn, &cfg.table, &header, sample, sanitizer.max_len())?;

    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    report.stats = db::insert_rows(conn, &cfg.table, &header, &rows, error_log, &pb)?;
    pb.finish_and_clear();

    info!(
        "Loaded {:?} into {}: {} inserted, {} already present",
        csv_path, cfg.table, report.stats.inserted, report.stats.duplicates
    );
    Ok(report)
}
