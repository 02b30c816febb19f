//! Daemon and clusterer configuration.
//!
//! Layering: built-in defaults, then `<graph-dir>/config.json` when present,
//! then CLI flag overrides. Invalid values are rejected before the daemon
//! touches the lock file (exit code 4 at the CLI boundary).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All recognized configuration options with their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Compression factor for the clusterer
    pub target_reduction: usize,
    /// Clusters smaller than this are merged into `misc`
    pub min_cluster_size: usize,
    /// Absolute cluster ceiling
    pub max_clusters: usize,
    /// Below this file count every file is its own cluster
    pub small_project_threshold: usize,
    /// Louvain move threshold
    pub resolution: f64,
    /// Batch coalescing delay in milliseconds
    pub quiescence_delay_ms: u64,
    /// Max files per batch
    pub batch_size: usize,
    /// Per-file extraction timeout in seconds
    pub extract_timeout_s: u64,
    /// Memory health threshold in megabytes
    pub memory_warn_mb: u64,
    /// Extractor concurrency (0 = number of CPU cores)
    pub worker_parallelism: usize,
    /// User-configured ignore patterns (gitignore-style globs)
    pub ignore_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_reduction: 100,
            min_cluster_size: 2,
            max_clusters: 50,
            small_project_threshold: 20,
            resolution: 1.0,
            quiescence_delay_ms: 500,
            batch_size: 10,
            extract_timeout_s: 30,
            memory_warn_mb: 500,
            worker_parallelism: 0,
            ignore_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration for a graph directory.
    ///
    /// Missing file means defaults; a malformed file is an error (the
    /// operator asked for overrides and should not silently lose them).
    pub fn load(graph_dir: &Path) -> Result<Self> {
        let path = graph_dir.join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Validate option ranges. Returns the messages for every violation so
    /// the operator can fix them all at once.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.target_reduction == 0 {
            problems.push("target_reduction must be at least 1".to_string());
        }
        if self.max_clusters == 0 {
            problems.push("max_clusters must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            problems.push("batch_size must be at least 1".to_string());
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            problems.push("resolution must be a positive number".to_string());
        }
        if self.extract_timeout_s == 0 {
            problems.push("extract_timeout_s must be at least 1".to_string());
        }
        problems
    }

    /// Effective extractor concurrency (resolves 0 to the CPU count).
    pub fn effective_parallelism(&self) -> usize {
        if self.worker_parallelism > 0 {
            self.worker_parallelism
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
