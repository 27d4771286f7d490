//! Single-instance guard backed by a PID lock file.
//!
//! The lock file holds the decimal PID of the owning process. A record whose
//! PID is not a live process is stale and gets overwritten. A live owner is
//! asked to terminate (and then killed) when takeover is enabled, which is how
//! a scheduled run displaces a previous run that is stuck on a slow share.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};

use crate::config::LockConfig;
use crate::error::{IngestError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Live guards per lock path within this process
fn holds() -> &'static Mutex<HashMap<PathBuf, usize>> {
    static HOLDS: OnceLock<Mutex<HashMap<PathBuf, usize>>> = OnceLock::new();
    HOLDS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Record one more guard for `path`, starting from scratch when `fresh`
fn hold(path: &Path, fresh: bool) {
    let mut holds = holds().lock().unwrap_or_else(|e| e.into_inner());
    let count = holds.entry(path.to_path_buf()).or_insert(0);
    *count = if fresh { 1 } else { *count + 1 };
}

/// Drop one guard for `path`; true when it was the last one
fn unhold(path: &Path) -> bool {
    let mut holds = holds().lock().unwrap_or_else(|e| e.into_inner());
    match holds.get_mut(path) {
        Some(count) if *count > 1 => {
            *count -= 1;
            false
        }
        _ => {
            holds.remove(path);
            true
        }
    }
}

/// What the lock file currently says
#[derive(Debug, PartialEq)]
enum LockRecord {
    Absent,
    Pid(u32),
    Unreadable,
}

/// Owns the lock file for as long as it lives.
///
/// Dropping the guard releases the lock, so every exit path that unwinds or
/// returns through `main` cleans up after itself. Acquiring again from the
/// same process hands out another guard on the same file; the file is only
/// removed when the last of them is released.
#[derive(Debug)]
pub struct SingleInstanceGuard {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl SingleInstanceGuard {
    /// Acquire the lock at `path` for the current process.
    ///
    /// Returns `LockUnavailable` when a live previous owner cannot be
    /// displaced (takeover disabled, or termination not confirmed).
    pub fn acquire(path: impl Into<PathBuf>, options: &LockConfig) -> Result<Self> {
        let path = path.into();
        let pid = std::process::id();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                IngestError::LockUnavailable(format!(
                    "cannot create lock directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // Second pass covers a competitor creating the file between our read
        // and our create-if-absent.
        for _ in 0..2 {
            match read_record(&path) {
                LockRecord::Absent => match create_new(&path, pid) {
                    Ok(()) => {
                        log::info!("Lock file created (PID: {})", pid);
                        return Ok(Self::owned(path, pid, true));
                    }
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                    Err(e) => return Err(write_failed(&path, e)),
                },
                LockRecord::Pid(owner) if owner == pid => {
                    log::debug!("Lock already held by this process (PID: {})", pid);
                    return Ok(Self::owned(path, pid, false));
                }
                LockRecord::Pid(owner) => {
                    if process_is_alive(owner) {
                        if !options.takeover {
                            return Err(IngestError::LockUnavailable(format!(
                                "previous instance still running (PID: {})",
                                owner
                            )));
                        }
                        log::warn!(
                            "Previous instance still running (PID: {}). Terminating...",
                            owner
                        );
                        if !terminate_process(owner, options.timeout) {
                            return Err(IngestError::LockUnavailable(format!(
                                "failed to terminate previous instance (PID: {})",
                                owner
                            )));
                        }
                        log::info!("Previous instance (PID: {}) terminated", owner);
                    } else {
                        log::info!(
                            "Stale lock file found (PID: {} is not running). Replacing it",
                            owner
                        );
                    }
                    overwrite(&path, pid)?;
                    return Ok(Self::owned(path, pid, true));
                }
                LockRecord::Unreadable => {
                    log::warn!("Lock file {} is unreadable, replacing it", path.display());
                    overwrite(&path, pid)?;
                    return Ok(Self::owned(path, pid, true));
                }
            }
        }

        Err(IngestError::LockUnavailable(format!(
            "lock file {} changed while acquiring",
            path.display()
        )))
    }

    fn owned(path: PathBuf, pid: u32, fresh: bool) -> Self {
        hold(&path, fresh);
        Self {
            path,
            pid,
            released: false,
        }
    }

    /// PID recorded in the lock
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file. Idempotent; never fails the caller.
    ///
    /// Other live guards of this process keep the file. A lock that now names
    /// another PID belongs to whoever took over and is left alone.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if !unhold(&self.path) {
            log::debug!("Lock still held by another guard of this process");
            return;
        }

        if let LockRecord::Pid(owner) = read_record(&self.path) {
            if owner != self.pid {
                log::warn!(
                    "Lock file now belongs to PID {}, leaving it in place",
                    owner
                );
                return;
            }
        }

        match fs::remove_file(&self.path) {
            Ok(()) => log::info!("Lock file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove lock file {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_record(path: &Path) -> LockRecord {
    match fs::read_to_string(path) {
        Ok(content) => content
            .trim()
            .parse::<u32>()
            .map(LockRecord::Pid)
            .unwrap_or(LockRecord::Unreadable),
        Err(e) if e.kind() == ErrorKind::NotFound => LockRecord::Absent,
        Err(_) => LockRecord::Unreadable,
    }
}

fn create_new(path: &Path, pid: u32) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(pid.to_string().as_bytes())
}

fn overwrite(path: &Path, pid: u32) -> Result<()> {
    fs::write(path, pid.to_string()).map_err(|e| write_failed(path, e))?;
    log::info!("Lock file created (PID: {})", pid);
    Ok(())
}

fn write_failed(path: &Path, e: std::io::Error) -> IngestError {
    IngestError::LockUnavailable(format!("cannot write lock file {}: {}", path.display(), e))
}

/// Whether `pid` names a running process. Zombies count as dead.
pub fn process_is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    system
        .process(pid)
        .map(|p| p.status() != ProcessStatus::Zombie)
        .unwrap_or(false)
}

fn wait_for_exit(pid: u32, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if !process_is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Graceful termination first, forced kill after `grace`.
///
/// Returns true once the process is confirmed gone.
fn terminate_process(pid: u32, grace: Duration) -> bool {
    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]));
    let Some(process) = system.process(sys_pid) else {
        return true;
    };

    // None means the platform has no SIGTERM equivalent; go straight to kill.
    if process.kill_with(Signal::Term).unwrap_or(false) && wait_for_exit(pid, grace) {
        return true;
    }

    if !process.kill() {
        log::error!("Failed to send kill signal to PID {}", pid);
    }
    wait_for_exit(pid, grace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(takeover: bool) -> LockConfig {
        LockConfig {
            timeout: Duration::from_secs(2),
            takeover,
        }
    }

    #[test]
    fn test_acquire_creates_and_drop_removes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state/photo_ingest.lock");

        let guard = SingleInstanceGuard::acquire(&path, &options(true)).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, std::process::id().to_string());
        assert_eq!(guard.pid(), std::process::id());

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_same_process_reacquire_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo_ingest.lock");

        let mut first = SingleInstanceGuard::acquire(&path, &options(true)).unwrap();
        let before = fs::read_to_string(&path).unwrap();
        let mut second = SingleInstanceGuard::acquire(&path, &options(true)).unwrap();
        let after = fs::read_to_string(&path).unwrap();

        assert_eq!(before, after);
        assert_eq!(second.pid(), first.pid());
        assert_eq!(second.path(), first.path());

        // The file outlives the first guard while the second one is alive.
        first.release();
        first.release();
        assert!(path.exists());

        second.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_unreadable_lock_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo_ingest.lock");
        fs::write(&path, "not-a-pid").unwrap();

        let _guard = SingleInstanceGuard::acquire(&path, &options(false)).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_release_leaves_foreign_lock() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo_ingest.lock");

        let mut guard = SingleInstanceGuard::acquire(&path, &options(true)).unwrap();
        fs::write(&path, "4194000").unwrap();
        guard.release();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_pid_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo_ingest.lock");

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();
        fs::write(&path, dead_pid.to_string()).unwrap();

        assert!(!process_is_alive(dead_pid));
        let _guard = SingleInstanceGuard::acquire(&path, &options(false)).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_live_owner_is_terminated_on_takeover() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo_ingest.lock");

        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        fs::write(&path, child.id().to_string()).unwrap();
        assert!(process_is_alive(child.id()));

        let guard = SingleInstanceGuard::acquire(&path, &options(true)).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert_eq!(fs::read_to_string(&path).unwrap(), guard.pid().to_string());
    }

    #[cfg(unix)]
    #[test]
    fn test_live_owner_refused_without_takeover() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo_ingest.lock");

        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        fs::write(&path, child.id().to_string()).unwrap();

        let result = SingleInstanceGuard::acquire(&path, &options(false));
        assert!(matches!(result, Err(IngestError::LockUnavailable(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), child.id().to_string());

        child.kill().unwrap();
        child.wait().unwrap();
    }
}
