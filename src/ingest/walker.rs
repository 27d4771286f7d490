use chrono::{DateTime, Local, NaiveDateTime};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::{IngestError, Result};
use crate::ingest::classify::has_image_extension;
use crate::ingest::window::ProcessingWindow;

const PROGRESS_EVERY: usize = 1000;

/// An image selected for this run
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub relative_path: String,
    /// Later of modification and change/creation time, local clock
    pub reference_time: NaiveDateTime,
}

/// Later of mtime and ctime (creation time where there is no ctime).
///
/// A photo copied onto the share keeps its camera mtime, but its ctime is
/// the moment it arrived, which is what the window is about.
pub fn reference_time(metadata: &Metadata) -> std::io::Result<NaiveDateTime> {
    let modified = metadata.modified()?;
    let changed = changed_time(metadata).unwrap_or(modified);
    let latest = modified.max(changed);
    Ok(DateTime::<Local>::from(latest).naive_local())
}

#[cfg(unix)]
fn changed_time(metadata: &Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    let secs = u64::try_from(metadata.ctime()).ok()?;
    let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
    SystemTime::UNIX_EPOCH.checked_add(std::time::Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn changed_time(metadata: &Metadata) -> Option<SystemTime> {
    metadata.created().ok()
}

/// Keep the entries inside `window`, oldest first.
///
/// The sort is stable, so equal reference times keep discovery order.
pub fn select_in_window(
    entries: Vec<CandidateFile>,
    window: &ProcessingWindow,
) -> Vec<CandidateFile> {
    let mut selected: Vec<CandidateFile> = entries
        .into_iter()
        .filter(|c| window.contains(c.reference_time))
        .collect();
    selected.sort_by_key(|c| c.reference_time);
    selected
}

/// Walk `root` once and return the images whose reference time lies in `window`.
///
/// Entries that cannot be stat'ed are skipped. Problems with `root` itself
/// (missing, not a directory, unreadable) abort the scan.
pub fn scan(root: &Path, window: &ProcessingWindow) -> Result<Vec<CandidateFile>> {
    check_root(root)?;

    let mut entries = Vec::new();
    let mut visited = 0usize;

    log::info!("Scanning {} for images", root.display());

    for entry in WalkDir::new(root).follow_links(true) {
        visited += 1;
        if visited % PROGRESS_EVERY == 0 {
            log::info!("Checked {} entries...", visited);
        }

        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk failed"));
                return Err(IngestError::directory(root, source));
            }
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !has_image_extension(path) {
            continue;
        }

        let reference = match entry.metadata().map_err(std::io::Error::from) {
            Ok(metadata) => reference_time(&metadata),
            Err(e) => Err(e),
        };
        let reference_time = match reference {
            Ok(t) => t,
            Err(e) => {
                log::debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        entries.push(CandidateFile {
            path: path.to_path_buf(),
            relative_path,
            reference_time,
        });
    }

    let selected = select_in_window(entries, window);
    log::info!(
        "Scan finished: {} entries checked, {} images in window {} .. {}",
        visited,
        selected.len(),
        window.start,
        window.end
    );
    Ok(selected)
}

pub(crate) fn check_root(root: &Path) -> Result<()> {
    let metadata = std::fs::metadata(root).map_err(|e| IngestError::directory(root, e))?;
    if !metadata.is_dir() {
        return Err(IngestError::directory(
            root,
            std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
        ));
    }
    std::fs::read_dir(root).map_err(|e| IngestError::directory(root, e))?;
    Ok(())
}
