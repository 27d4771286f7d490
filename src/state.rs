//! Persisted "last run" watermark.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk record, one JSON object
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub last_run: Option<NaiveDateTime>,
}

/// Reads and overwrites the run-state file.
///
/// Persistence is best-effort: a lost or unreadable record only widens the
/// next window back to the start of the day.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Timestamp saved by the previous run, if any
    pub fn last_run(&self) -> Option<NaiveDateTime> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read run state {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<RunState>(&content) {
            Ok(state) => state.last_run,
            Err(e) => {
                log::warn!("Malformed run state {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Overwrite the record with `moment`
    pub fn save(&self, moment: NaiveDateTime) {
        if let Err(e) = self.write(moment) {
            log::warn!("Could not persist run state {}: {}", self.path.display(), e);
        }
    }

    fn write(&self, moment: NaiveDateTime) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(&RunState {
            last_run: Some(moment),
        })?;
        std::fs::write(&self.path, payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = RunStateStore::new(temp_dir.path().join("run_state.json"));
        assert_eq!(store.last_run(), None);
    }

    #[test]
    fn test_save_creates_parent_and_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let store = RunStateStore::new(temp_dir.path().join("nested/state/run_state.json"));
        store.save(ts(10, 0, 0));
        assert_eq!(store.last_run(), Some(ts(10, 0, 0)));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"last_run\": \"2024-01-01T10:00:00\""));
    }

    #[test]
    fn test_save_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = RunStateStore::new(temp_dir.path().join("run_state.json"));

        store.save(ts(9, 30, 0));
        let once = std::fs::read(store.path()).unwrap();
        store.save(ts(9, 30, 0));
        let twice = std::fs::read(store.path()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run_state.json");
        std::fs::write(&path, "{ last_run: yesterday").unwrap();
        assert_eq!(RunStateStore::new(&path).last_run(), None);

        std::fs::write(&path, r#"{"last_run": "not a date"}"#).unwrap();
        assert_eq!(RunStateStore::new(&path).last_run(), None);
    }

    #[test]
    fn test_save_into_unwritable_location_does_not_panic() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let store = RunStateStore::new(blocker.join("run_state.json"));
        store.save(ts(8, 0, 0));
        assert_eq!(store.last_run(), None);
    }
}
