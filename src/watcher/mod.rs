//! Filesystem watcher with debounced batch events.
//!
//! The debounce window implements the quiescence delay: all events within
//! the window are collected, de-duplicated, classified, sorted, and emitted
//! as a single [`WatcherBatch`]. The underlying debouncer does not preserve
//! event types, so classification checks the filesystem at drain time: a
//! path that no longer exists is a removal, anything else is an upsert.
//! That makes processing deterministic regardless of how the OS coalesced
//! the raw events, and it means rapid edit-save sequences collapse into one
//! upsert of the final content.

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::graph::filter::FileFilter;

/// Bound on pending paths in a single drain. Bursts beyond this keep only
/// the most recent entries, with a warning.
pub const MAX_PENDING_PATHS: usize = 100;

/// What happened to a path, as far as the store is concerned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// File is gone; remove it from the store
    Removed,
    /// File exists (created or modified); re-extract it
    Upserted,
}

/// One classified filesystem event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileEvent {
    pub kind: EventKind,
    /// Absolute path of the affected file
    pub path: PathBuf,
}

/// Deterministic batch of classified events.
///
/// Removals sort before upserts, and paths within each kind are
/// lexicographic, so the same drained set always applies in the same order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatcherBatch {
    pub events: Vec<FileEvent>,
}

impl WatcherBatch {
    /// Build a batch from classified events, sorting removals first.
    pub fn from_events(mut events: Vec<FileEvent>) -> Self {
        events.sort();
        events.dedup();
        Self { events }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Split into chunks of at most `max` events, preserving order.
    /// Removals stay ahead of upserts across the chunk boundary.
    pub fn split(self, max: usize) -> Vec<WatcherBatch> {
        if self.events.len() <= max {
            return vec![self];
        }
        self.events
            .chunks(max.max(1))
            .map(|chunk| WatcherBatch {
                events: chunk.to_vec(),
            })
            .collect()
    }
}

/// Filesystem watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Root directory to watch recursively
    pub root_path: PathBuf,
    /// Quiescence delay in milliseconds
    pub quiescence_delay_ms: u64,
    /// User-configured exclude patterns
    pub ignore_patterns: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            quiescence_delay_ms: 500,
            ignore_patterns: Vec::new(),
        }
    }
}

/// Watcher that emits debounced batches of classified events.
pub struct FileSystemWatcher {
    batch_receiver: Receiver<WatcherBatch>,
    _watcher_thread: thread::JoinHandle<()>,
}

impl FileSystemWatcher {
    /// Start watching `config.root_path` recursively.
    ///
    /// The watcher thread exits when `shutdown` is set or the receiver is
    /// dropped.
    pub fn new(config: WatcherConfig, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let (batch_tx, batch_rx) = mpsc::channel();

        // Compile the filter once; re-parsing ignore rules per event would
        // dominate the cost of small batches.
        let filter = FileFilter::new(&config.root_path, &config.ignore_patterns)?;

        let thread = thread::spawn(move || {
            if let Err(e) = run_watcher(config, filter, batch_tx, shutdown) {
                eprintln!("Watcher error: {:?}", e);
            }
        });

        Ok(Self {
            batch_receiver: batch_rx,
            _watcher_thread: thread,
        })
    }

    /// Receive the next batch with a timeout.
    ///
    /// # Returns
    /// - `Ok(Some(batch))` when a batch arrived
    /// - `Ok(None)` on timeout
    /// - `Err(_)` when the watcher thread is gone (watch subsystem lost)
    pub fn recv_batch_timeout(&self, timeout: Duration) -> Result<Option<WatcherBatch>> {
        match self.batch_receiver.recv_timeout(timeout) {
            Ok(batch) => Ok(Some(batch)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                anyhow::bail!("watcher channel disconnected")
            }
        }
    }

    /// Try to receive a batch without blocking.
    pub fn try_recv_batch(&self) -> Option<WatcherBatch> {
        self.batch_receiver.try_recv().ok()
    }
}

/// Run the debouncer in a dedicated thread until shutdown.
fn run_watcher(
    config: WatcherConfig,
    filter: FileFilter,
    tx: Sender<WatcherBatch>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let quiescence = Duration::from_millis(config.quiescence_delay_ms);

    let mut debouncer = new_debouncer(
        quiescence,
        move |result: notify_debouncer_mini::DebounceEventResult| match result {
            Ok(events) => {
                let paths: Vec<&Path> = events.iter().map(|e| e.path.as_path()).collect();
                let batch = classify_paths(&paths, &filter);
                if !batch.is_empty() {
                    let _ = tx.send(batch);
                }
            }
            Err(error) => {
                eprintln!("Watcher error: {:?}", error);
            }
        },
    )?;

    debouncer
        .watcher()
        .watch(&config.root_path, RecursiveMode::Recursive)?;

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    Ok(())
}

/// Filter, de-duplicate, bound, and classify a drained set of paths.
pub fn classify_paths(paths: &[&Path], filter: &FileFilter) -> WatcherBatch {
    let mut dirty: BTreeSet<PathBuf> = BTreeSet::new();

    for path in paths {
        // Directories never enter the store
        if path.is_dir() {
            continue;
        }
        // Lexical check only: removed files no longer exist on disk
        if filter.should_skip_lexical(path).is_some() {
            continue;
        }
        dirty.insert(path.to_path_buf());
    }

    if dirty.len() > MAX_PENDING_PATHS {
        eprintln!(
            "Warning: {} pending paths, processing most recent {}",
            dirty.len(),
            MAX_PENDING_PATHS
        );
        let excess = dirty.len() - MAX_PENDING_PATHS;
        dirty = dirty.into_iter().skip(excess).collect();
    }

    let events: Vec<FileEvent> = dirty
        .into_iter()
        .map(|path| {
            let kind = if path.exists() {
                EventKind::Upserted
            } else {
                EventKind::Removed
            };
            FileEvent { kind, path }
        })
        .collect();

    WatcherBatch::from_events(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, path: &str) -> FileEvent {
        FileEvent {
            kind,
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn batch_orders_removals_first() {
        let batch = WatcherBatch::from_events(vec![
            event(EventKind::Upserted, "/a.py"),
            event(EventKind::Removed, "/z.py"),
            event(EventKind::Upserted, "/b.py"),
        ]);
        assert_eq!(batch.events[0].kind, EventKind::Removed);
        assert_eq!(batch.events[1].path, PathBuf::from("/a.py"));
        assert_eq!(batch.events[2].path, PathBuf::from("/b.py"));
    }

    #[test]
    fn batch_dedupes_events() {
        let batch = WatcherBatch::from_events(vec![
            event(EventKind::Upserted, "/a.py"),
            event(EventKind::Upserted, "/a.py"),
        ]);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn split_preserves_order() {
        let events: Vec<FileEvent> = (0..25)
            .map(|i| event(EventKind::Upserted, &format!("/f{:02}.py", i)))
            .collect();
        let batch = WatcherBatch::from_events(events);
        let chunks = batch.split(10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
        assert_eq!(chunks[0].events[0].path, PathBuf::from("/f00.py"));
        assert_eq!(chunks[2].events[4].path, PathBuf::from("/f24.py"));
    }

    #[test]
    fn split_small_batch_is_identity() {
        let batch = WatcherBatch::from_events(vec![event(EventKind::Upserted, "/a.py")]);
        let chunks = batch.clone().split(10);
        assert_eq!(chunks, vec![batch]);
    }

    #[test]
    fn classify_marks_missing_as_removed() {
        use tempfile::TempDir;
        let tmp = TempDir::new().unwrap();
        let existing = tmp.path().join("here.py");
        std::fs::write(&existing, b"x = 1").unwrap();
        let missing = tmp.path().join("gone.py");

        let filter = FileFilter::new(tmp.path(), &[]).unwrap();
        let batch = classify_paths(&[existing.as_path(), missing.as_path()], &filter);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.events[0].kind, EventKind::Removed);
        assert_eq!(batch.events[0].path, missing);
        assert_eq!(batch.events[1].kind, EventKind::Upserted);
    }

    #[test]
    fn classify_filters_unwatched_and_ignored() {
        use tempfile::TempDir;
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules")).unwrap();
        let ignored = tmp.path().join("node_modules/dep.js");
        std::fs::write(&ignored, b"x").unwrap();
        let readme = tmp.path().join("README.md");
        std::fs::write(&readme, b"x").unwrap();

        let filter = FileFilter::new(tmp.path(), &[]).unwrap();
        let batch = classify_paths(&[ignored.as_path(), readme.as_path()], &filter);
        assert!(batch.is_empty());
    }

    #[test]
    fn overflow_keeps_most_recent_paths() {
        use tempfile::TempDir;
        let tmp = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..150)
            .map(|i| tmp.path().join(format!("f{:03}.py", i)))
            .collect();
        let refs: Vec<&Path> = paths.iter().map(|p| p.as_path()).collect();
        let filter = FileFilter::new(tmp.path(), &[]).unwrap();
        let batch = classify_paths(&refs, &filter);
        assert_eq!(batch.len(), MAX_PENDING_PATHS);
        // The lexicographically-last (most recent in sorted order) survive
        assert!(batch
            .events
            .iter()
            .all(|e| e.path.file_name().unwrap().to_string_lossy().as_ref() >= "f050.py"));
    }

    #[test]
    fn live_watcher_emits_create_batch() {
        use tempfile::TempDir;
        let tmp = TempDir::new().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let config = WatcherConfig {
            root_path: tmp.path().to_path_buf(),
            quiescence_delay_ms: 100,
            ignore_patterns: Vec::new(),
        };
        let watcher = FileSystemWatcher::new(config, shutdown.clone()).unwrap();

        // Give the watcher time to start
        thread::sleep(Duration::from_millis(200));
        std::fs::write(tmp.path().join("new.py"), b"x = 1").unwrap();

        let mut received = None;
        for _ in 0..40 {
            if let Ok(Some(batch)) = watcher.recv_batch_timeout(Duration::from_millis(250)) {
                received = Some(batch);
                break;
            }
        }
        shutdown.store(true, Ordering::SeqCst);

        let batch = received.expect("should receive a batch for the new file");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.events[0].kind, EventKind::Upserted);
        assert!(batch.events[0].path.ends_with("new.py"));
    }
}
