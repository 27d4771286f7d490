//! Bounded fixed-delay retries for reads and writes on a flaky share.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::RetryPolicy;
use crate::error::{IngestError, Result};

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `what` names the operation in warnings. The last I/O error is returned
/// as `IngestError::Transient`.
pub fn with_retry<T, F>(path: &Path, policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> std::io::Result<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.attempts => {
                log::warn!(
                    "{} {} failed (attempt {}/{}): {}. Retrying",
                    what,
                    path.display(),
                    attempt,
                    policy.attempts,
                    e
                );
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(IngestError::Transient {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source: e,
                })
            }
        }
    }
}

/// Wait until `path` can be opened and read.
///
/// Photos copied onto a network share can stay locked by the writer for a
/// moment after they show up.
pub fn wait_until_readable(path: &Path, policy: RetryPolicy) -> Result<()> {
    with_retry(path, policy, "Reading", || {
        let mut buf = [0u8; 1];
        File::open(path)?.read(&mut buf).map(|_| ())
    })
}
