//! Make room for a new output without losing the previous one.
//!
//! The previous output is moved to a sibling backup (`1234.jpg` becomes
//! `1234.bkp.jpg`) only once the new content is already encoded in memory,
//! so the path is empty for the span of one rename plus one write. Outputs on
//! a share can be held open by readers, so every step degrades instead of
//! failing.

use std::fs;
use std::path::{Path, PathBuf};

/// How the destination was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Nothing was there
    Fresh,
    /// Previous output moved to the backup path
    BackedUp,
    /// Previous output deleted, no backup kept
    Removed,
    /// Previous output could be neither moved nor deleted; overwrite in place
    InPlace,
}

/// Destination prepared for writing
#[derive(Debug)]
pub struct WriteTarget {
    dest: PathBuf,
    backup: PathBuf,
    mode: ReplaceMode,
}

/// Sibling backup path for `dest`
pub fn backup_path(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match dest.extension() {
        Some(ext) => format!("{}.bkp.{}", stem, ext.to_string_lossy()),
        None => format!("{}.bkp", stem),
    };
    dest.with_file_name(name)
}

pub struct AtomicReplacer;

impl AtomicReplacer {
    /// Clear `dest` for a fresh write, keeping a backup when possible.
    pub fn prepare(dest: &Path) -> WriteTarget {
        let backup = backup_path(dest);
        let mode = if !dest.exists() {
            ReplaceMode::Fresh
        } else {
            if backup.exists() {
                if let Err(e) = fs::remove_file(&backup) {
                    log::debug!("Could not remove old backup {}: {}", backup.display(), e);
                }
            }

            match fs::rename(dest, &backup) {
                Ok(()) => ReplaceMode::BackedUp,
                Err(e) => {
                    log::warn!(
                        "Could not back up {} ({}). Deleting the old file",
                        dest.display(),
                        e
                    );
                    match fs::remove_file(dest) {
                        Ok(()) => ReplaceMode::Removed,
                        Err(e) => {
                            log::warn!(
                                "Could not delete old file {} ({}). Overwriting in place",
                                dest.display(),
                                e
                            );
                            ReplaceMode::InPlace
                        }
                    }
                }
            }
        };

        WriteTarget {
            dest: dest.to_path_buf(),
            backup,
            mode,
        }
    }
}

impl WriteTarget {
    /// Path the new content goes to
    pub fn path(&self) -> &Path {
        &self.dest
    }

    pub fn mode(&self) -> ReplaceMode {
        self.mode
    }

    /// Backup taken by `prepare`, if any
    pub fn backup(&self) -> Option<&Path> {
        (self.mode == ReplaceMode::BackedUp).then_some(self.backup.as_path())
    }

    /// Put the backup back after a failed write.
    ///
    /// Returns true when the previous output was restored.
    pub fn rollback(self) -> bool {
        if self.mode != ReplaceMode::BackedUp || !self.backup.exists() {
            return false;
        }
        if self.dest.exists() {
            if let Err(e) = fs::remove_file(&self.dest) {
                log::warn!(
                    "Could not remove partial output {}: {}",
                    self.dest.display(),
                    e
                );
                return false;
            }
        }
        match fs::rename(&self.backup, &self.dest) {
            Ok(()) => {
                log::info!("Restored previous output {}", self.dest.display());
                true
            }
            Err(e) => {
                log::warn!("Could not restore backup {}: {}", self.backup.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/out/1234.jpg")),
            PathBuf::from("/out/1234.bkp.jpg")
        );
        assert_eq!(backup_path(Path::new("out/1234")), PathBuf::from("out/1234.bkp"));
    }

    #[test]
    fn test_fresh_destination() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("1234.jpg");

        let target = AtomicReplacer::prepare(&dest);
        assert_eq!(target.mode(), ReplaceMode::Fresh);
        assert!(target.backup().is_none());
        assert!(!backup_path(&dest).exists());
    }

    #[test]
    fn test_existing_destination_is_backed_up_then_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("1234.jpg");
        fs::write(&dest, b"old photo").unwrap();
        fs::write(backup_path(&dest), b"older photo").unwrap();

        let target = AtomicReplacer::prepare(&dest);
        assert_eq!(target.mode(), ReplaceMode::BackedUp);
        assert!(!dest.exists());
        fs::write(target.path(), b"new photo").unwrap();

        let backups: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".bkp."))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(backup_path(&dest)).unwrap(), b"old photo");
        assert_eq!(fs::read(&dest).unwrap(), b"new photo");
    }

    #[test]
    fn test_rollback_restores_previous_output() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("1234.jpg");
        fs::write(&dest, b"old photo").unwrap();

        let target = AtomicReplacer::prepare(&dest);
        fs::write(target.path(), b"half writ").unwrap();
        assert!(target.rollback());

        assert_eq!(fs::read(&dest).unwrap(), b"old photo");
        assert!(!backup_path(&dest).exists());
    }

    #[test]
    fn test_rollback_without_backup_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("1234.jpg");

        let target = AtomicReplacer::prepare(&dest);
        assert!(!target.rollback());
    }

    #[cfg(unix)]
    #[test]
    fn test_destination_that_cannot_be_moved_or_deleted_is_overwritten_in_place() {
        let temp_dir = TempDir::new().unwrap();
        // A non-empty directory named like the output can be neither renamed
        // onto an existing backup directory nor removed as a file.
        let dest = temp_dir.path().join("1234.jpg");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("inner"), b"x").unwrap();
        let backup = backup_path(&dest);
        fs::create_dir(&backup).unwrap();
        fs::write(backup.join("inner"), b"y").unwrap();

        let target = AtomicReplacer::prepare(&dest);
        assert_eq!(target.mode(), ReplaceMode::InPlace);
        assert!(dest.exists());
    }
}
