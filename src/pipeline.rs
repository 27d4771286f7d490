//! One ingestion run: window → scan → process each file → save watermark.

use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task;

use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::ingest::{compute_window, ingest_file, scan, FileOutcome, ProcessingWindow};
use crate::lock::SingleInstanceGuard;
use crate::sinks::UpdateSink;
use crate::state::RunStateStore;

/// How a completed run went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    PartialFailure,
}

/// Counts for one completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub window: ProcessingWindow,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    /// Files found in the window
    pub selected: usize,
    pub processed: usize,
    /// Selected files that turned out not to be images
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn outcome(&self) -> RunOutcome {
        if self.failed == 0 {
            RunOutcome::Success
        } else {
            RunOutcome::PartialFailure
        }
    }
}

/// Orchestrates a run over the configured source tree
pub struct IngestionPipeline<U: UpdateSink> {
    config: Config,
    state: RunStateStore,
    update_sink: Option<U>,
}

fn worker_failed(e: task::JoinError) -> IngestError {
    IngestError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("worker task failed: {}", e),
    ))
}

impl<U: UpdateSink> IngestionPipeline<U> {
    pub fn new(config: Config, update_sink: Option<U>) -> Self {
        let state = RunStateStore::new(config.state_path());
        Self {
            config,
            state,
            update_sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &RunStateStore {
        &self.state
    }

    /// Window the next run starting at `now` would cover
    pub fn window_at(&self, now: NaiveDateTime) -> ProcessingWindow {
        compute_window(now, self.state.last_run())
    }

    /// Scan without processing or touching the run state
    pub async fn preview(&self, now: NaiveDateTime) -> Result<Vec<PathBuf>> {
        let window = self.window_at(now);
        let source = self.config.source_dir().to_path_buf();
        let candidates = task::spawn_blocking(move || scan(&source, &window))
            .await
            .map_err(worker_failed)??;
        Ok(candidates.into_iter().map(|c| c.path).collect())
    }

    /// Execute one run starting at `now`.
    ///
    /// Holding `guard` proves this process owns the instance lock. Directory
    /// errors end the run before the watermark moves; per-file errors are
    /// counted and the watermark always advances to the window end.
    pub async fn run(&self, guard: &SingleInstanceGuard, now: NaiveDateTime) -> Result<RunSummary> {
        let (_stop_tx, stop_rx) = watch::channel(None);
        self.run_until(guard, now, stop_rx).await
    }

    /// Like `run`, but stops between files once `stop` carries a signal label.
    ///
    /// The file in flight is always finished, so its output is complete
    /// before the caller lets go of the lock. A stopped run returns
    /// `Interrupted` and leaves the watermark where it was.
    pub async fn run_until(
        &self,
        _guard: &SingleInstanceGuard,
        now: NaiveDateTime,
        stop: watch::Receiver<Option<&'static str>>,
    ) -> Result<RunSummary> {
        let window = self.window_at(now);
        log::info!("Processing window: {} .. {}", window.start, window.end);

        let dest_dir = self.config.dest_dir().to_path_buf();
        std::fs::create_dir_all(&dest_dir).map_err(|e| IngestError::directory(&dest_dir, e))?;

        let source = self.config.source_dir().to_path_buf();
        let candidates = task::spawn_blocking(move || scan(&source, &window))
            .await
            .map_err(worker_failed)??;

        let total = candidates.len();
        log::info!("Images found: {}", total);

        let mut processed = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for (idx, candidate) in candidates.iter().enumerate() {
            let requested = *stop.borrow();
            if let Some(signal) = requested {
                log::warn!(
                    "Stopping after {} of {} files ({} requested)",
                    idx,
                    total,
                    signal
                );
                return Err(IngestError::Interrupted(signal.to_string()));
            }
            log::info!("[{}/{}] Processing: {}", idx + 1, total, candidate.relative_path);

            match self.process_path(&candidate.path).await {
                Ok(FileOutcome::Written { output, report, .. }) => {
                    processed += 1;
                    log::info!(
                        "✓ {} -> {} ({} bytes, quality {}, {} passes)",
                        candidate.relative_path,
                        output.display(),
                        report.final_size(),
                        report.final_quality().unwrap_or_default(),
                        report.attempts.len()
                    );
                }
                Ok(FileOutcome::Skipped) => skipped += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    failed += 1;
                    log::error!("✗ {}: {}", candidate.relative_path, e);
                }
            }
        }

        self.state.save(window.end);

        if failed == 0 {
            log::info!("Images processed: {}", processed);
        } else {
            log::error!("Images processed: {} | errors: {}", processed, failed);
        }

        Ok(RunSummary {
            window,
            started_at: now,
            finished_at: Local::now().naive_local(),
            selected: total,
            processed,
            skipped,
            failed,
        })
    }

    /// Process one source file and announce the output.
    ///
    /// The update sink is best-effort: its failures are logged and do not
    /// turn a written output into an error.
    pub async fn process_path(&self, path: &Path) -> Result<FileOutcome> {
        let source = path.to_path_buf();
        let dest_dir = self.config.dest_dir().to_path_buf();
        let compression = self.config.compression.clone();
        let retry = self.config.retry.clone();

        let outcome = task::spawn_blocking(move || {
            ingest_file(&source, &dest_dir, &compression, &retry)
        })
        .await
        .map_err(worker_failed)??;

        if let (FileOutcome::Written { output, .. }, Some(sink)) = (&outcome, &self.update_sink) {
            if let Err(e) = sink.photo_updated(output).await {
                log::error!("{}", e);
            }
        }

        Ok(outcome)
    }
}
