use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// One extracted listing, aligned with the source header.
pub type Row = Vec<Option<String>>;

/// Marker written into fields an extractor could not read.
pub const UNAVAILABLE: &str = "N/A";

/// A record whose every field is the unavailable marker.
pub fn placeholder(width: usize) -> Row {
    vec![Some(UNAVAILABLE.to_string()); width]
}

/// Pad or cut a row so it lines up with a header of `width` fields.
pub fn fit_width(mut row: Row, width: usize) -> Row {
    row.resize(width, None);
    row
}

/// Overwrite `path` with header + rows. Returns the size of the written file.
///
/// The file is written next to its destination and renamed into place, so a
/// reader never sees a half-written CSV.
pub fn write_csv(path: &Path, header: &[String], rows: &[Row]) -> Result<u64> {
    let tmp = tmp_path(path);
    {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("Failed to create {:?}", tmp))?;
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("Failed to move CSV into {:?}", path))?;
    Ok(fs::metadata(path)?.len())
}

/// Sibling path used for write-then-rename.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_width_pads_and_cuts() {
        let short = vec![Some("a".to_string())];
        assert_eq!(fit_width(short, 3), vec![Some("a".to_string()), None, None]);

        let long = vec![Some("a".into()), Some("b".into()), Some("c".into())];
        assert_eq!(fit_width(long, 2).len(), 2);
    }

    #[test]
    fn csv_has_header_and_empty_cells_for_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let header = vec!["Name".to_string(), "Founded".to_string()];
        let rows = vec![
            vec![Some("Acme, Inc".to_string()), Some("2019".to_string())],
            vec![Some("Solo".to_string()), None],
        ];

        let bytes = write_csv(&path, &header, &rows).unwrap();
        let text = fs::read_to_string(&path).unwrap();

        assert_eq!(text, "Name,Founded\n\"Acme, Inc\",2019\nSolo,\n");
        assert_eq!(bytes, text.len() as u64);
        assert!(!tmp_path(&path).exists());
    }
}
