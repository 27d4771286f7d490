pub mod classify;
pub mod compress;
pub mod replace;
pub mod retry;
pub mod walker;
pub mod window;

pub use classify::{is_image, IMAGE_EXTENSIONS};
pub use compress::{compress, CompressionAttempt, CompressionReport, EncodedPhoto};
pub use replace::{AtomicReplacer, ReplaceMode, WriteTarget};
pub use retry::wait_until_readable;
pub use walker::{scan, CandidateFile};
pub use window::{compute_window, ProcessingWindow};

use std::path::{Path, PathBuf};

use crate::config::{CompressionConfig, RetryConfig};
use crate::error::Result;

/// What happened to one source file
#[derive(Debug)]
pub enum FileOutcome {
    /// Compressed output written to `output`
    Written {
        output: PathBuf,
        report: CompressionReport,
        mode: ReplaceMode,
    },
    /// Not an image after all
    Skipped,
}

/// Output location for `source`: `<dest_dir>/<stem>.jpg`
pub fn output_path(source: &Path, dest_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest_dir.join(format!("{}.jpg", stem))
}

/// Convenience function to ingest a single file
///
/// Orchestrates the per-file steps: classify → wait for the share → decode
/// and encode in memory → make room at the destination → write (rolling back
/// on failure). The previous output stays in place until encoded bytes are
/// ready. Blocking; run it on a blocking worker from async code.
pub fn ingest_file(
    source: &Path,
    dest_dir: &Path,
    compression: &CompressionConfig,
    retry: &RetryConfig,
) -> Result<FileOutcome> {
    if !is_image(source) {
        log::info!("Skipping {}: not an image", source.display());
        return Ok(FileOutcome::Skipped);
    }

    wait_until_readable(source, retry.read)?;
    let photo = EncodedPhoto::from_source(source, compression)?;

    let output = output_path(source, dest_dir);
    let target = AtomicReplacer::prepare(&output);
    let mode = target.mode();

    match photo.write(target.path(), compression, retry.write) {
        Ok(report) => {
            log::info!(target: "photos", "{}", output.display());
            Ok(FileOutcome::Written {
                output,
                report,
                mode,
            })
        }
        Err(e) => {
            target.rollback();
            Err(e)
        }
    }
}
