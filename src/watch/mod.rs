//! Watch mode: process photos as soon as they land in the source tree.
//!
//! Uses the notify crate to watch the directory, debounces events, and runs
//! the per-file pipeline step for each new file. The time window and run
//! state are not involved; the scheduled run still catches anything missed
//! while the watcher was down.

mod watcher;

pub use watcher::is_arrival;

use std::path::Path;
use tokio::sync::{mpsc, watch};

use crate::error::{IngestError, Result};
use crate::ingest::walker::check_root;
use crate::ingest::FileOutcome;
use crate::pipeline::IngestionPipeline;
use crate::sinks::UpdateSink;

/// Whether an event path should go through the pipeline.
///
/// Outputs are skipped in case the destination lives inside the source tree.
pub fn should_process(path: &Path, dest_dir: &Path) -> bool {
    path.is_file() && !path.starts_with(dest_dir)
}

/// Handle a single arrived file
pub async fn handle_new_file<U: UpdateSink>(pipeline: &IngestionPipeline<U>, path: &Path) -> Result<()> {
    if !should_process(path, pipeline.config().dest_dir()) {
        return Ok(());
    }

    log::info!("New file detected: {}", path.display());
    let start = std::time::Instant::now();

    match pipeline.process_path(path).await? {
        FileOutcome::Written { output, .. } => {
            log::info!("watch: {} -> {} in {:?}", path.display(), output.display(), start.elapsed());
        }
        FileOutcome::Skipped => {}
    }
    Ok(())
}

/// Run the file watcher until `stop` carries a signal label.
///
/// The root is checked and watched up front, so an offline share fails the
/// call with a directory error. A file being processed when the stop request
/// arrives is finished first. Fatal per-file errors end the watch; others are
/// logged and the next arrival is handled.
pub async fn run_watcher<U: UpdateSink>(
    pipeline: &IngestionPipeline<U>,
    debounce_ms: u64,
    mut stop: watch::Receiver<Option<&'static str>>,
) -> Result<()> {
    let root = pipeline.config().source_dir().to_path_buf();
    check_root(&root)?;
    let root_watch = watcher::watch_root(&root)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || watcher::run_watcher_thread(root_watch, debounce_ms, tx));

    loop {
        if let Some(signal) = *stop.borrow() {
            log::info!("Watcher stopping ({})", signal);
            return Ok(());
        }

        let path = tokio::select! {
            path = rx.recv() => path,
            changed = stop.changed() => {
                if changed.is_err() {
                    log::warn!("Stop channel closed, stopping watcher");
                    return Ok(());
                }
                continue;
            }
        };

        let Some(path) = path else {
            return Err(IngestError::directory(
                &root,
                std::io::Error::other("watcher thread stopped"),
            ));
        };

        match handle_new_file(pipeline, &path).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log::error!("✗ {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sinks::ProductPhotoApi;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn pipeline_for(source: &Path, root: &Path) -> IngestionPipeline<ProductPhotoApi> {
        let source = source.to_string_lossy().into_owned();
        let dest = root.join("out").to_string_lossy().into_owned();
        let state = root.join("state").to_string_lossy().into_owned();
        let config = Config::from_lookup(|key| match key {
            "SOURCE_DIR" => Some(source.clone()),
            "DEST_DIR" => Some(dest.clone()),
            "STATE_DIR" => Some(state.clone()),
            "API_ENABLED" | "TELEGRAM_ENABLED" => Some("false".to_string()),
            _ => None,
        })
        .unwrap();
        IngestionPipeline::new(config, None)
    }

    #[tokio::test]
    async fn test_run_watcher_offline_root_is_directory_error() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_for(&root.path().join("offline-share"), root.path());
        let (_stop_tx, stop_rx) = watch::channel(None);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_watcher(&pipeline, 50, stop_rx),
        )
        .await
        .unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, IngestError::DirectoryAccess { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_run_watcher_returns_on_stop_request() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("share");
        fs::create_dir_all(&source).unwrap();
        let pipeline = pipeline_for(&source, root.path());
        let (stop_tx, stop_rx) = watch::channel(None);

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop_tx.send(Some("SIGTERM")).unwrap();
        };
        let (result, ()) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(run_watcher(&pipeline, 50, stop_rx), stopper) },
        )
        .await
        .unwrap();

        assert!(result.is_ok());
    }

    #[test]
    fn test_should_process_regular_file() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("out");
        let file_path = root.path().join("4711.jpg");
        fs::write(&file_path, b"jpeg").unwrap();

        assert!(should_process(&file_path, &dest));
    }

    #[test]
    fn test_should_process_skips_outputs_and_directories() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        let output = dest.join("4711.jpg");
        fs::write(&output, b"jpeg").unwrap();

        assert!(!should_process(&output, &dest));
        assert!(!should_process(&dest, root.path().join("elsewhere").as_path()));
        assert!(!should_process(&root.path().join("gone.jpg"), &dest));
    }
}
