//! Single-instance daemon lock.
//!
//! The lock file holds the daemon PID as plain text. Acquisition refuses to
//! proceed while the recorded process is alive; a lock left behind by a
//! dead process is cleaned up and re-acquired.

use crate::graph::snapshot::GraphDir;
use anyhow::{Context, Result};
use std::path::PathBuf;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// Error separating "someone else is running" from real I/O failures.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another daemon instance is running (pid {0})")]
    Held(u32),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// An acquired lock. Released on drop or explicit [`LockFile::release`].
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    held: bool,
}

impl LockFile {
    /// Acquire the lock for this graph directory.
    pub fn acquire(graph_dir: &GraphDir) -> Result<Self, LockError> {
        let path = graph_dir.lock_path();

        if let Some(pid) = read_pid(&path) {
            if process_alive(pid) {
                return Err(LockError::Held(pid));
            }
            // Stale lock from a dead process
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove stale lock {}", path.display()))?;
        }

        let pid = std::process::id();
        std::fs::write(&path, format!("{}\n", pid))
            .with_context(|| format!("failed to write lock {}", path.display()))?;

        Ok(Self { path, held: true })
    }

    /// Release explicitly (also happens on drop).
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.held {
            let _ = std::fs::remove_file(&self.path);
            self.held = false;
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// PID recorded in a lock file, if the file exists and parses.
pub fn read_pid(path: &std::path::Path) -> Option<u32> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}

/// Whether a process with this PID currently exists.
pub fn process_alive(pid: u32) -> bool {
    let refresh = RefreshKind::new().with_processes(ProcessRefreshKind::new());
    let sys = System::new_with_specifics(refresh);
    sys.process(Pid::from_u32(pid)).is_some()
}

/// Deliver a signal to the daemon recorded in the lock file.
///
/// Returns false when no live daemon was found.
pub fn signal_daemon(graph_dir: &GraphDir, signal: sysinfo::Signal) -> Result<bool> {
    let Some(pid) = read_pid(&graph_dir.lock_path()) else {
        return Ok(false);
    };
    let refresh = RefreshKind::new().with_processes(ProcessRefreshKind::new());
    let sys = System::new_with_specifics(refresh);
    let Some(process) = sys.process(Pid::from_u32(pid)) else {
        return Ok(false);
    };
    match process.kill_with(signal) {
        Some(sent) => Ok(sent),
        None => anyhow::bail!("signal {:?} not supported on this platform", signal),
    }
}

/// Resident set size of the current process in megabytes.
pub fn current_memory_mb() -> u64 {
    let refresh = RefreshKind::new().with_processes(ProcessRefreshKind::new().with_memory());
    let sys = System::new_with_specifics(refresh);
    match sysinfo::get_current_pid() {
        Ok(pid) => sys
            .process(pid)
            .map(|p| p.memory() / (1024 * 1024))
            .unwrap_or(0),
        Err(_) => 0,
    }
}
