use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::records::{self, Row};

/// Progress of a paginated scrape: the page to fetch next and everything collected so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub page_num: u32,
    pub data: Vec<Row>,
    /// Listings of `page_num` already in `data` when the save happened mid-page.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub page_offset: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            page_num: 1,
            data: Vec::new(),
            page_offset: 0,
        }
    }
}

/// JSON checkpoint plus a CSV mirror of the same rows.
pub struct CheckpointStore {
    json_path: PathBuf,
    csv_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(json_path: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            json_path: json_path.into(),
            csv_path: csv_path.into(),
        }
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Last saved progress, or a fresh start at page 1.
    pub fn load(&self) -> Checkpoint {
        let text = match fs::read_to_string(&self.json_path) {
            Ok(text) => text,
            Err(_) => return Checkpoint::default(),
        };
        match serde_json::from_str::<Checkpoint>(&text) {
            Ok(cp) => Checkpoint {
                page_num: cp.page_num.max(1),
                ..cp
            },
            Err(e) => {
                warn!("Ignoring unreadable checkpoint {:?}: {}", self.json_path, e);
                Checkpoint::default()
            }
        }
    }

    /// Overwrite both the checkpoint and its CSV mirror.
    pub fn save(&self, header: &[String], checkpoint: &Checkpoint) -> Result<()> {
        let tmp = records::tmp_path(&self.json_path);
        let json = serde_json::to_string(checkpoint)?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.json_path)
            .with_context(|| format!("Failed to move checkpoint into {:?}", self.json_path))?;
        records::write_csv(&self.csv_path, header, &checkpoint.data)?;
        info!(
            "Progress saved. Current page: {}, records collected: {}",
            checkpoint.page_num,
            checkpoint.data.len()
        );
        Ok(())
    }

    /// Forget saved progress. The CSV mirror stays as the last output.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.json_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", self.json_path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        vec!["Name".to_string(), "Founded".to_string()]
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| vec![Some(format!("company-{}", i)), None])
            .collect()
    }

    #[test]
    fn missing_file_starts_at_page_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"), dir.path().join("out.csv"));
        assert_eq!(store.load(), Checkpoint::default());
        assert_eq!(store.load().page_num, 1);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"), dir.path().join("out.csv"));
        let cp = Checkpoint {
            page_num: 4,
            data: rows(12),
            page_offset: 0,
        };

        store.save(&header(), &cp).unwrap();
        assert_eq!(store.load(), cp);

        let mirror = fs::read_to_string(store.csv_path()).unwrap();
        assert_eq!(mirror.lines().count(), 13);
        assert!(mirror.starts_with("Name,Founded\n"));
    }

    #[test]
    fn file_format_matches_progress_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let store = CheckpointStore::new(&path, dir.path().join("out.csv"));
        store
            .save(
                &header(),
                &Checkpoint {
                    page_num: 2,
                    data: vec![vec![Some("Acme".to_string()), None]],
                    page_offset: 0,
                },
            )
            .unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "page_num": 2, "data": [["Acme", null]] }));
    }

    #[test]
    fn reads_checkpoint_without_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, r#"{"page_num": 3, "data": [["a", "b"]]}"#).unwrap();

        let cp = CheckpointStore::new(&path, dir.path().join("out.csv")).load();
        assert_eq!(cp.page_num, 3);
        assert_eq!(cp.page_offset, 0);
        assert_eq!(cp.data.len(), 1);
    }

    #[test]
    fn corrupt_file_is_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(CheckpointStore::new(&path, dir.path().join("out.csv")).load(), Checkpoint::default());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"), dir.path().join("out.csv"));
        store.save(&header(), &Checkpoint::default()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load(), Checkpoint::default());
        assert!(store.csv_path().exists());
    }
}
