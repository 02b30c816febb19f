//! Daemon supervisor: lock, signals, event loop, health.
//!
//! One long-lived process per repository. Startup acquires the lock,
//! restores the store from the snapshot (or performs a full scan), then
//! loops: drain watcher batches, extract, apply, re-cluster when membership
//! drifted, snapshot, update metrics. SIGTERM/SIGINT drain and exit;
//! SIGUSR1 forces a full re-scan. If the watch subsystem dies and cannot be
//! re-established the daemon degrades to periodic full scans instead of
//! going blind.

pub mod lock;

pub use lock::{LockError, LockFile};

use crate::config::Config;
use crate::diagnostics::ErrorKind;
use crate::graph::cluster::{build_supergraph, needs_recluster, SuperGraph};
use crate::graph::filter::FileFilter;
use crate::graph::snapshot::GraphDir;
use crate::graph::store::GraphStore;
use crate::metrics::{health_warnings, HealthThresholds, Metrics};
use crate::pipeline::{BatchOutcome, Pipeline};
use crate::watcher::{FileSystemWatcher, WatcherConfig};
use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Health check cadence.
const HEALTH_INTERVAL: Duration = Duration::from_secs(60);
/// Poll granularity of the event loop.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Re-establish attempts before degrading to periodic scans.
const WATCHER_RETRIES: u32 = 3;
/// Scan cadence in degraded (watcherless) mode.
const DEGRADED_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Errors that map to distinct process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("{0}")]
    LockHeld(#[from] LockError),
    #[error("graph store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The running daemon.
pub struct Daemon {
    graph_dir: GraphDir,
    pipeline: Pipeline,
    store: Arc<RwLock<GraphStore>>,
    metrics: Metrics,
    shutdown: Arc<AtomicBool>,
    refresh: Arc<AtomicBool>,
    supergraph: SuperGraph,
    /// Node count at the last clustering run
    clustered_at: Option<usize>,
    /// Size of the most recent drained batch, for the queue health bound
    last_batch_len: usize,
    /// (updates, errors) at the previous health check
    health_baseline: (u64, u64),
}

/// Run the daemon until a stop signal. Blocking.
pub fn run(root: &Path, config: Config) -> Result<(), DaemonError> {
    let graph_dir = GraphDir::for_repo(root);
    graph_dir.ensure_exists().map_err(DaemonError::Other)?;

    let _lock = LockFile::acquire(&graph_dir)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let refresh = Arc::new(AtomicBool::new(false));
    install_signal_handlers(shutdown.clone(), refresh.clone()).map_err(DaemonError::Other)?;

    let mut daemon = Daemon::initialize(graph_dir, root, config, shutdown, refresh)?;
    daemon.log("daemon started");
    daemon.event_loop()?;
    daemon.finalize();
    Ok(())
}

/// SIGTERM/SIGINT set the shutdown flag; SIGUSR1 sets the refresh flag.
fn install_signal_handlers(shutdown: Arc<AtomicBool>, refresh: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::signal;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([signal::SIGTERM, signal::SIGINT, signal::SIGUSR1])?;
    std::thread::spawn(move || {
        for sig in &mut signals {
            match sig {
                signal::SIGUSR1 => refresh.store(true, Ordering::SeqCst),
                _ => {
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    });
    Ok(())
}

impl Daemon {
    fn initialize(
        graph_dir: GraphDir,
        root: &Path,
        config: Config,
        shutdown: Arc<AtomicBool>,
        refresh: Arc<AtomicBool>,
    ) -> Result<Self, DaemonError> {
        let pipeline = Pipeline::new(root, config).map_err(DaemonError::Other)?;

        // Restore prior state where possible
        let loaded = graph_dir.load_store().map_err(DaemonError::Other)?;
        let metrics = match graph_dir.load_metrics() {
            Ok(Some(file)) => Metrics::restore(&file.daemon),
            _ => Metrics::new(),
        };

        let had_snapshot = loaded.is_some();
        let store = Arc::new(RwLock::new(loaded.unwrap_or_default()));

        let mut daemon = Self {
            graph_dir,
            pipeline,
            store,
            metrics,
            shutdown,
            refresh,
            supergraph: SuperGraph::empty(),
            clustered_at: None,
            last_batch_len: 0,
            health_baseline: (0, 0),
        };

        // Initial scan when there is no snapshot or it predates the newest
        // watched source file
        let needs_scan = !had_snapshot || daemon.snapshot_is_stale();
        if needs_scan {
            daemon.log("initial scan");
            let outcome = daemon.run_full_scan()?;
            daemon.log(&format!(
                "initial scan done: {} indexed, {} removed, {} skipped, {} errors",
                outcome.applied,
                outcome.removed,
                outcome.skipped,
                outcome.error_count()
            ));
        } else if let Ok(Some(supergraph)) = daemon.graph_dir.load_supergraph() {
            daemon.clustered_at = Some(supergraph.metadata.total_files);
            daemon.supergraph = supergraph;
        }

        daemon.recluster_if_needed(true);
        daemon.write_snapshot();
        Ok(daemon)
    }

    /// Snapshot older than any watched source file means edits happened
    /// while the daemon was down.
    fn snapshot_is_stale(&self) -> bool {
        let Some(snapshot_mtime) = self.graph_dir.snapshot_mtime() else {
            return true;
        };
        let filter = match FileFilter::new(
            self.pipeline.root(),
            &self.pipeline.config().ignore_patterns,
        ) {
            Ok(f) => f,
            Err(_) => return true,
        };
        for entry in walkdir::WalkDir::new(self.pipeline.root())
            .follow_links(false)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            let path = entry.path();
            if path.is_dir() || filter.should_skip(path).is_some() {
                continue;
            }
            if let Ok(meta) = path.metadata() {
                if let Ok(mtime) = meta.modified() {
                    if mtime > snapshot_mtime {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn event_loop(&mut self) -> Result<(), DaemonError> {
        let mut watcher = self.start_watcher().map_err(DaemonError::Other)?;
        let mut last_health = Instant::now();
        let mut degraded_since: Option<Instant> = None;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.log("stop signal received, draining");
                // Drain whatever the watcher already queued
                if let Some(w) = &watcher {
                    while let Some(batch) = w.try_recv_batch() {
                        self.handle_batch(batch)?;
                    }
                }
                break;
            }

            if self.refresh.swap(false, Ordering::SeqCst) {
                self.log("refresh signal received, re-scanning");
                let outcome = self.run_full_scan()?;
                self.log(&format!(
                    "refresh done: {} indexed, {} removed",
                    outcome.applied, outcome.removed
                ));
                self.write_snapshot();
            }

            let received = watcher
                .as_ref()
                .map(|w| w.recv_batch_timeout(POLL_INTERVAL));
            match received {
                Some(Ok(Some(batch))) => self.handle_batch(batch)?,
                Some(Ok(None)) => {}
                Some(Err(_)) => {
                    self.log(&format!("[{}] watch subsystem lost", ErrorKind::WatcherLost));
                    watcher = self.reestablish_watcher();
                    // A None here means degraded mode; the first scan runs
                    // immediately
                    degraded_since = None;
                }
                None => {
                    // Degraded mode: periodic full scans
                    std::thread::sleep(POLL_INTERVAL);
                    let due = degraded_since
                        .map(|t| t.elapsed() >= DEGRADED_SCAN_INTERVAL)
                        .unwrap_or(true);
                    if due {
                        let outcome = self.run_full_scan()?;
                        if outcome.applied + outcome.removed > 0 {
                            self.write_snapshot();
                        }
                        degraded_since = Some(Instant::now());
                    }
                }
            }

            if last_health.elapsed() >= HEALTH_INTERVAL {
                self.health_check();
                last_health = Instant::now();
            }
        }
        Ok(())
    }

    fn start_watcher(&self) -> Result<Option<FileSystemWatcher>> {
        let config = WatcherConfig {
            root_path: self.pipeline.root().to_path_buf(),
            quiescence_delay_ms: self.pipeline.config().quiescence_delay_ms,
            ignore_patterns: self.pipeline.config().ignore_patterns.clone(),
        };
        Ok(Some(FileSystemWatcher::new(config, self.shutdown.clone())?))
    }

    fn reestablish_watcher(&mut self) -> Option<FileSystemWatcher> {
        for attempt in 1..=WATCHER_RETRIES {
            match self.start_watcher() {
                Ok(watcher) => {
                    self.log(&format!("watcher re-established (attempt {})", attempt));
                    return watcher;
                }
                Err(e) => {
                    self.log(&format!(
                        "watcher restart attempt {}/{} failed: {}",
                        attempt, WATCHER_RETRIES, e
                    ));
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
        self.log("falling back to periodic full-scan mode");
        None
    }

    fn handle_batch(&mut self, batch: crate::watcher::WatcherBatch) -> Result<(), DaemonError> {
        self.last_batch_len = batch.len();
        for chunk in batch.split(self.pipeline.config().batch_size) {
            let started = Instant::now();
            let outcome = self.pipeline.process_batch(&self.store, &chunk);
            self.account(&outcome, started);

            for diagnostic in &outcome.diagnostics {
                if diagnostic.is_error() {
                    self.log(&diagnostic.to_string());
                }
            }

            self.recluster_if_needed(false);
            self.write_snapshot();
        }
        Ok(())
    }

    fn run_full_scan(&mut self) -> Result<BatchOutcome, DaemonError> {
        let filter = FileFilter::new(
            self.pipeline.root(),
            &self.pipeline.config().ignore_patterns,
        )
        .map_err(DaemonError::Other)?;
        let started = Instant::now();
        let outcome = self
            .pipeline
            .full_scan(&self.store, &filter)
            .map_err(DaemonError::Other)?;
        self.account(&outcome, started);
        self.recluster_if_needed(true);
        Ok(outcome)
    }

    fn account(&self, outcome: &BatchOutcome, started: Instant) {
        self.metrics.record_update(started.elapsed());
        for _ in 0..outcome.error_count() {
            self.metrics.record_error();
        }
        for _ in 0..outcome.skipped {
            self.metrics.record_skipped();
        }
    }

    /// Re-run community detection when membership drifted more than the
    /// policy allows, or unconditionally on `force`.
    fn recluster_if_needed(&mut self, force: bool) {
        let node_count = self.store.read().expect("store lock poisoned").node_count();
        if force || needs_recluster(self.clustered_at, node_count) {
            let store = self.store.read().expect("store lock poisoned");
            self.supergraph = build_supergraph(&store, self.pipeline.config());
            self.clustered_at = Some(node_count);
        }
    }

    /// Persist the artifact set. Failures are logged and absorbed: the
    /// previous snapshot stays valid.
    fn write_snapshot(&self) {
        let store = self.store.read().expect("store lock poisoned");
        let result = self
            .graph_dir
            .write_snapshot(&store, &self.metrics.snapshot(), &self.supergraph);
        if let Err(e) = result {
            self.metrics.record_error();
            self.log(&format!("snapshot failed: {}", e));
        }
    }

    fn health_check(&mut self) {
        self.metrics.sample_memory(lock::current_memory_mb());
        let snapshot = self.metrics.snapshot();
        let window_updates = snapshot.updates.saturating_sub(self.health_baseline.0);
        let window_errors = snapshot.errors.saturating_sub(self.health_baseline.1);
        self.health_baseline = (snapshot.updates, snapshot.errors);

        let thresholds = HealthThresholds {
            memory_warn_mb: self.pipeline.config().memory_warn_mb,
            ..HealthThresholds::default()
        };
        for warning in health_warnings(
            &snapshot,
            window_updates,
            window_errors,
            &thresholds,
            self.last_batch_len,
        ) {
            self.log(&format!("health: {}", warning));
        }
    }

    fn finalize(&mut self) {
        self.recluster_if_needed(true);
        self.write_snapshot();
        self.log("daemon stopped");
    }

    /// Append a timestamped line to daemon.log and stderr.
    fn log(&self, message: &str) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let line = format!("[{}] {}\n", ts, message);
        eprint!("{}", line);
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.graph_dir.log_path())
        {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

/// Map a daemon error to its process exit code.
pub fn exit_code_for(error: &DaemonError) -> i32 {
    match error {
        DaemonError::LockHeld(LockError::Held(_)) => 2,
        DaemonError::LockHeld(LockError::Io(_)) => 3,
        DaemonError::StoreUnavailable(_) => 1,
        DaemonError::Other(e) => {
            if e.to_string().contains("snapshot") {
                3
            } else {
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_held_maps_to_exit_code_2() {
        let err = DaemonError::LockHeld(LockError::Held(12345));
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn generic_errors_map_to_exit_code_1() {
        let err = DaemonError::Other(anyhow::anyhow!("boom"));
        assert_eq!(exit_code_for(&err), 1);
    }
}
