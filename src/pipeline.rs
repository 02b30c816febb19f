//! Batch processing pipeline: events in, store deltas out.
//!
//! Extraction parallelizes across a bounded rayon pool (file reads and
//! parses are the expensive part); store application stays sequential under
//! the write lock, which is what makes a batch atomic for readers. Within a
//! batch, removals apply before upserts. After every batch a single
//! resolution sweep upgrades still-external targets, so files added earlier
//! in the batch satisfy later files' imports.

use crate::config::Config;
use crate::diagnostics::{Diagnostic, SkipReason};
use crate::extract::{self, detect_language, ExtractionRecord};
use crate::graph::filter::FileFilter;
use crate::graph::store::GraphStore;
use crate::validation::{normalize_key, repo_relative_key};
use crate::watcher::{EventKind, FileEvent, WatcherBatch};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

/// Outcome of one processed batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Files whose extraction was applied
    pub applied: usize,
    /// Files removed from the store
    pub removed: usize,
    /// Files skipped (unchanged content, filtered)
    pub skipped: usize,
    /// Edges upgraded by the post-batch resolution sweep
    pub resolved: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchOutcome {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    fn merge(&mut self, other: BatchOutcome) {
        self.applied += other.applied;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.resolved += other.resolved;
        self.diagnostics.extend(other.diagnostics);
    }
}

/// The extract-and-apply pipeline for one repository.
pub struct Pipeline {
    root: PathBuf,
    config: Config,
    pool: rayon::ThreadPool,
}

impl Pipeline {
    pub fn new(root: &Path, config: Config) -> Result<Self> {
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("repository root not accessible: {}", root.display()))?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.effective_parallelism())
            .build()
            .context("failed to build extractor pool")?;
        Ok(Self { root, config, pool })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one batch of classified events against the store.
    ///
    /// Phase 1 (no lock): read and extract every upserted file in parallel.
    /// Phase 2 (write lock): apply removals, then deltas, then the
    /// resolution sweep. Readers observe the store before or after the
    /// apply phase, never mid-batch.
    pub fn process_batch(&self, store: &RwLock<GraphStore>, batch: &WatcherBatch) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        let mut removals: Vec<String> = Vec::new();
        let mut upserts: Vec<(String, PathBuf)> = Vec::new();

        for event in &batch.events {
            match self.event_key(event) {
                Some(key) => match event.kind {
                    EventKind::Removed => removals.push(key),
                    EventKind::Upserted => upserts.push((key, event.path.clone())),
                },
                None => {
                    outcome.diagnostics.push(Diagnostic::skipped(
                        event.path.to_string_lossy(),
                        SkipReason::NotAFile,
                    ));
                }
            }
        }

        // Hash short-circuit: skip files whose content is unchanged
        let known_hashes: Vec<Option<String>> = {
            let store = store.read().expect("store lock poisoned");
            upserts
                .iter()
                .map(|(key, _)| store.node(key).map(|n| n.content_hash.clone()))
                .collect()
        };

        let timeout = Duration::from_secs(self.config.extract_timeout_s);
        let extractions: Vec<ExtractOutcome> = self.pool.install(|| {
            upserts
                .par_iter()
                .zip(known_hashes.par_iter())
                .map(|((key, path), known_hash)| {
                    extract_one(key, path, known_hash.as_deref(), timeout)
                })
                .collect()
        });

        {
            let mut store = store.write().expect("store lock poisoned");

            for key in &removals {
                store.remove_file(key);
                outcome.removed += 1;
            }

            for extraction in extractions {
                match extraction {
                    ExtractOutcome::Record(record, warning) => {
                        store.apply_record(&record);
                        outcome.applied += 1;
                        if let Some(warning) = warning {
                            outcome.diagnostics.push(warning);
                        }
                    }
                    ExtractOutcome::Unchanged(key) => {
                        outcome.skipped += 1;
                        outcome
                            .diagnostics
                            .push(Diagnostic::skipped(key, SkipReason::Unchanged));
                    }
                    ExtractOutcome::Vanished => {
                        // Deleted between the event and the read; the next
                        // removal event cleans up
                    }
                    ExtractOutcome::Failed(diagnostic) => {
                        outcome.diagnostics.push(diagnostic);
                    }
                }
            }

            outcome.resolved = store.resolve_pending();
        }

        outcome
    }

    /// Walk the repository and process every eligible file as an upsert.
    ///
    /// Used for the initial scan, the refresh verb, and the degraded
    /// periodic-rescan mode. Files already in the store with unchanged
    /// content are skipped by the hash short-circuit.
    pub fn full_scan(&self, store: &RwLock<GraphStore>, filter: &FileFilter) -> Result<BatchOutcome> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            if filter.should_skip(path).is_none() {
                candidates.push(path.to_path_buf());
            }
        }
        candidates.sort();

        // Files that vanished from disk since the last snapshot
        let on_disk: std::collections::BTreeSet<String> = candidates
            .iter()
            .filter_map(|path| repo_relative_key(path, &self.root).ok())
            .collect();
        let stale_keys: Vec<String> = {
            let store = store.read().expect("store lock poisoned");
            store
                .nodes()
                .map(|n| n.path.clone())
                .filter(|key| !on_disk.contains(key))
                .collect()
        };

        let mut outcome = BatchOutcome::default();
        let mut events: Vec<FileEvent> = stale_keys
            .into_iter()
            .map(|key| FileEvent {
                kind: EventKind::Removed,
                path: self.root.join(key),
            })
            .collect();
        events.extend(candidates.into_iter().map(|path| FileEvent {
            kind: EventKind::Upserted,
            path,
        }));

        for chunk in WatcherBatch::from_events(events).split(self.config.batch_size) {
            outcome.merge(self.process_batch(store, &chunk));
        }
        Ok(outcome)
    }

    /// Repository-relative key for an event path.
    ///
    /// Upserts validate through canonicalization; removals can't (the file
    /// is gone), so they strip the root prefix lexically.
    fn event_key(&self, event: &FileEvent) -> Option<String> {
        match event.kind {
            EventKind::Upserted => repo_relative_key(&event.path, &self.root).ok(),
            EventKind::Removed => {
                let rel = event.path.strip_prefix(&self.root).ok()?;
                Some(normalize_key(&rel.to_string_lossy()))
            }
        }
    }
}

enum ExtractOutcome {
    Record(ExtractionRecord, Option<Diagnostic>),
    Unchanged(String),
    Vanished,
    Failed(Diagnostic),
}

fn extract_one(
    key: &str,
    path: &Path,
    known_hash: Option<&str>,
    timeout: Duration,
) -> ExtractOutcome {
    let Some(language) = detect_language(path) else {
        return ExtractOutcome::Failed(Diagnostic::skipped(key, SkipReason::UnsupportedLanguage));
    };

    let source = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ExtractOutcome::Vanished,
        Err(e) => {
            return ExtractOutcome::Failed(Diagnostic::extract_failed(
                key,
                format!("read failed: {}", e),
            ))
        }
    };

    if let Some(known) = known_hash {
        if extract::content_hash(&source) == known {
            return ExtractOutcome::Unchanged(key.to_string());
        }
    }

    let (record, warning) = extract::extract_file(key, language, &source, timeout);
    ExtractOutcome::Record(record, warning)
}
