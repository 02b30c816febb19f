//! Daemon metrics: counters, gauges, and health checks.
//!
//! All fields are atomics so any thread (extract workers, applier, signal
//! thread) can update them without a lock. The exponential moving average
//! for update duration keeps the original daemon's 0.8/0.2 weighting.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Live metric counters shared across daemon threads.
#[derive(Debug)]
pub struct Metrics {
    updates: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    last_update: AtomicU64,
    /// EMA of update duration, stored as f64 bits
    avg_update_secs: AtomicU64,
    daemon_start: u64,
    memory_mb: AtomicU64,
}

/// Point-in-time serializable view of [`Metrics`], written into
/// `metrics.json` on every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub updates: u64,
    pub errors: u64,
    pub skipped: u64,
    /// Unix seconds of the last completed update (0 = never)
    pub last_update: u64,
    pub avg_update_secs: f64,
    /// Unix seconds when the daemon started
    pub daemon_start: u64,
    /// Last sampled resident set size in megabytes
    pub memory_mb: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            updates: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            last_update: AtomicU64::new(0),
            avg_update_secs: AtomicU64::new(0.0f64.to_bits()),
            daemon_start: now_secs(),
            memory_mb: AtomicU64::new(0),
        }
    }

    /// Restore counters from a previous snapshot (daemon restart).
    pub fn restore(snapshot: &MetricsSnapshot) -> Self {
        let m = Self::new();
        m.updates.store(snapshot.updates, Ordering::Relaxed);
        m.errors.store(snapshot.errors, Ordering::Relaxed);
        m.skipped.store(snapshot.skipped, Ordering::Relaxed);
        m.last_update.store(snapshot.last_update, Ordering::Relaxed);
        m.avg_update_secs
            .store(snapshot.avg_update_secs.to_bits(), Ordering::Relaxed);
        m
    }

    /// Record one completed update batch.
    ///
    /// The duration feeds the rolling average: `0.8 * old + 0.2 * new`,
    /// seeded with the first observation.
    pub fn record_update(&self, duration: Duration) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.last_update.store(now_secs(), Ordering::Relaxed);

        let secs = duration.as_secs_f64();
        let mut current = self.avg_update_secs.load(Ordering::Relaxed);
        loop {
            let old = f64::from_bits(current);
            let new = if old == 0.0 { secs } else { old * 0.8 + secs * 0.2 };
            match self.avg_update_secs.compare_exchange_weak(
                current,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_memory(&self, mb: u64) {
        self.memory_mb.store(mb, Ordering::Relaxed);
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            updates: self.updates.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            last_update: self.last_update.load(Ordering::Relaxed),
            avg_update_secs: f64::from_bits(self.avg_update_secs.load(Ordering::Relaxed)),
            daemon_start: self.daemon_start,
            memory_mb: self.memory_mb.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Health thresholds evaluated on the daemon's periodic check.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub memory_warn_mb: u64,
    /// errors / updates ratio above which the daemon warns
    pub error_rate_warn: f64,
    /// pending queue length above which the daemon warns
    pub queue_warn: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            memory_warn_mb: 500,
            error_rate_warn: 0.5,
            queue_warn: 100,
        }
    }
}

/// Evaluate health, returning human-readable warnings (empty = healthy).
///
/// `window_updates`/`window_errors` are the counts since the previous
/// health check, so the error rate reflects recent behavior instead of
/// process-lifetime totals.
pub fn health_warnings(
    snapshot: &MetricsSnapshot,
    window_updates: u64,
    window_errors: u64,
    thresholds: &HealthThresholds,
    queue_len: usize,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if snapshot.memory_mb > thresholds.memory_warn_mb {
        warnings.push(format!(
            "high memory usage: {}MB (threshold {}MB)",
            snapshot.memory_mb, thresholds.memory_warn_mb
        ));
    }

    if window_updates > 0 {
        let rate = window_errors as f64 / window_updates as f64;
        if rate > thresholds.error_rate_warn {
            warnings.push(format!(
                "high error rate: {:.0}% ({} errors / {} updates in window)",
                rate * 100.0,
                window_errors,
                window_updates
            ));
        }
    }

    if queue_len > thresholds.queue_warn {
        warnings.push(format!(
            "event queue backlog: {} pending paths (bound {})",
            queue_len, thresholds.queue_warn
        ));
    }

    warnings
}
