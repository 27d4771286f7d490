//! Watcher thread: notify + debounce, send newly arrived paths to main.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{IngestError, Result};

/// A live recursive watch on the source root and its raw event stream
pub struct RootWatch {
    // Kept alive for as long as events are wanted
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Event>,
}

/// Events that mean a file appeared under the root
pub fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Both))
    )
}

/// Start watching `root` recursively.
///
/// Failing to watch the root (missing, unreachable share) is a directory
/// error, same as a failed scan.
pub fn watch_root(root: &Path) -> Result<RootWatch> {
    let (event_tx, events) = mpsc::channel::<notify::Event>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) => {
                let _ = event_tx.send(ev);
            }
            Err(e) => log::warn!("watch error: {}", e),
        }
    })
    .map_err(|e| IngestError::Io(std::io::Error::other(format!("cannot start watcher: {}", e))))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| IngestError::directory(root, std::io::Error::other(e.to_string())))?;

    Ok(RootWatch {
        _watcher: watcher,
        events,
    })
}

/// Debounce loop: send each arrived path over `tx` once it has been quiet
/// for `debounce_ms`.
///
/// Writes to a pending path (a copy still in progress) restart its quiet
/// period. Returns when `tx`'s receiver is gone.
pub fn run_watcher_thread(watch: RootWatch, debounce_ms: u64, tx: UnboundedSender<PathBuf>) {
    let debounce = Duration::from_millis(debounce_ms);
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        match watch.events.recv_timeout(debounce) {
            Ok(ev) => {
                let now = Instant::now();
                let arrival = is_arrival(&ev.kind);
                for p in ev.paths {
                    if arrival || pending.contains_key(&p) {
                        pending.insert(p, now);
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if tx.is_closed() {
                    return;
                }
                let now = Instant::now();
                let ready: Vec<_> = pending
                    .iter()
                    .filter(|(_, t)| now.duration_since(**t) >= debounce)
                    .map(|(p, _)| p.clone())
                    .collect();
                for p in &ready {
                    pending.remove(p);
                }
                for p in ready {
                    if tx.send(p).is_err() {
                        return;
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use tempfile::TempDir;

    #[test]
    fn test_is_arrival() {
        assert!(is_arrival(&EventKind::Create(CreateKind::File)));
        assert!(is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(!is_arrival(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn test_watch_root_missing_is_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = watch_root(&temp_dir.path().join("offline-share")).err().unwrap();
        assert!(matches!(err, IngestError::DirectoryAccess { .. }));
        assert!(err.is_fatal());
    }
}
