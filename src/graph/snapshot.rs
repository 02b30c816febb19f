//! Snapshot I/O: the on-disk artifact set inside the graph directory.
//!
//! Every artifact is written to a `.tmp` sibling and renamed into place, so
//! a reader that opens any artifact at any moment sees a complete prior
//! write (a rename is atomic on the same filesystem). Failed writes retry
//! with backoff; after the retries are exhausted the previous snapshot
//! simply stays valid.

use crate::diagnostics::ErrorKind;
use crate::extract::Language;
use crate::graph::cluster::SuperGraph;
use crate::graph::store::{Edge, FileNode, GraphStore};
use crate::metrics::MetricsSnapshot;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Write attempts per artifact before giving up.
const WRITE_ATTEMPTS: u32 = 3;
/// Initial backoff between attempts; doubles each retry.
const BACKOFF: Duration = Duration::from_millis(50);

/// One daemon's graph directory.
///
/// The single owner of every path inside the snapshot directory; components
/// that need an artifact path get it from here instead of assembling their
/// own, so the layout has one definition.
#[derive(Debug, Clone)]
pub struct GraphDir {
    root: PathBuf,
}

/// Per-language-group node and edge listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageArtifact {
    pub language: String,
    pub nodes: Vec<FileNode>,
    pub edges: Vec<Edge>,
}

/// The metrics blob: daemon counters plus derived per-language state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsFile {
    pub daemon: MetricsSnapshot,
    /// File counts per language name
    pub languages: BTreeMap<String, usize>,
    /// Per-analyzer availability
    pub analyzers: BTreeMap<String, bool>,
}

/// Membership listing for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterMembers {
    pub id: String,
    pub files: Vec<String>,
}

impl GraphDir {
    /// Graph directory under a repository root (`<root>/.graph`).
    pub fn for_repo(repo_root: &Path) -> Self {
        Self {
            root: repo_root.join(".graph"),
        }
    }

    /// Use an explicit directory (tests, non-default layouts).
    pub fn at(path: PathBuf) -> Self {
        Self { root: path }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory tree if missing.
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.clusters_dir())
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        Ok(())
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("daemon.lock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("daemon.log")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.root.join("metrics.json")
    }

    pub fn supergraph_path(&self) -> PathBuf {
        self.root.join("supergraph.json")
    }

    pub fn clusters_dir(&self) -> PathBuf {
        self.root.join("clusters")
    }

    pub fn language_artifact_path(&self, group: &str) -> PathBuf {
        self.root.join(format!("{}.json", group))
    }

    /// Write the full artifact set. Partial failure degrades: whatever was
    /// renamed stays, whatever failed keeps its previous version.
    pub fn write_snapshot(
        &self,
        store: &GraphStore,
        metrics: &MetricsSnapshot,
        supergraph: &SuperGraph,
    ) -> Result<()> {
        self.ensure_exists()?;

        for group in Language::artifact_groups() {
            let artifact = language_artifact(store, group);
            write_json_atomic(&self.language_artifact_path(group), &artifact)?;
        }

        let metrics_file = MetricsFile {
            daemon: metrics.clone(),
            languages: store.language_counts(),
            analyzers: Language::artifact_groups()
                .iter()
                .map(|group| (group.to_string(), true))
                .collect(),
        };
        write_json_atomic(&self.metrics_path(), &metrics_file)?;

        write_json_atomic(&self.supergraph_path(), supergraph)?;
        self.write_cluster_members(supergraph)?;

        Ok(())
    }

    /// One membership artifact per cluster; stale ids are unlinked after
    /// the new set is in place.
    fn write_cluster_members(&self, supergraph: &SuperGraph) -> Result<()> {
        let dir = self.clusters_dir();
        std::fs::create_dir_all(&dir)?;

        for (id, info) in &supergraph.clusters {
            let members = ClusterMembers {
                id: id.clone(),
                files: info.files.clone(),
            };
            write_json_atomic(&dir.join(format!("{}.json", id)), &members)?;
        }

        // Unlink clusters that vanished in this run
        for entry in std::fs::read_dir(&dir)?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                if !supergraph.clusters.contains_key(id) {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
        Ok(())
    }

    /// Load the store from the per-language artifacts.
    ///
    /// Returns None when no artifact exists yet (fresh repository).
    pub fn load_store(&self) -> Result<Option<GraphStore>> {
        let mut store = GraphStore::new();
        let mut found_any = false;

        for group in Language::artifact_groups() {
            let path = self.language_artifact_path(group);
            if !path.exists() {
                continue;
            }
            found_any = true;
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let artifact: LanguageArtifact = serde_json::from_str(&data)
                .with_context(|| format!("malformed artifact {}", path.display()))?;
            store.absorb_artifact(artifact);
        }

        if !found_any {
            return Ok(None);
        }
        store.rebuild_incoming();
        Ok(Some(store))
    }

    pub fn load_supergraph(&self) -> Result<Option<SuperGraph>> {
        let path = self.supergraph_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data).with_context(|| {
            format!("malformed supergraph {}", path.display())
        })?))
    }

    pub fn load_metrics(&self) -> Result<Option<MetricsFile>> {
        let path = self.metrics_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data).with_context(|| {
            format!("malformed metrics {}", path.display())
        })?))
    }

    /// Newest modification time across artifacts, for the daemon's
    /// staleness check on startup.
    pub fn snapshot_mtime(&self) -> Option<SystemTime> {
        let mut newest = None;
        for group in Language::artifact_groups() {
            let path = self.language_artifact_path(group);
            if let Ok(meta) = std::fs::metadata(&path) {
                if let Ok(mtime) = meta.modified() {
                    newest = Some(newest.map_or(mtime, |n: SystemTime| n.max(mtime)));
                }
            }
        }
        newest
    }
}

/// Split out one language group's nodes and their edges.
fn language_artifact(store: &GraphStore, group: &str) -> LanguageArtifact {
    let nodes: Vec<FileNode> = store
        .nodes()
        .filter(|node| node.language.artifact_group() == group)
        .cloned()
        .collect();
    let edges: Vec<Edge> = nodes
        .iter()
        .flat_map(|node| store.out_edges(&node.path, None).cloned().collect::<Vec<_>>())
        .collect();
    LanguageArtifact {
        language: group.to_string(),
        nodes,
        edges,
    }
}

/// Serialize to a `.tmp` sibling and rename into place, with backoff retry.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).context("serialization failed")?;
    let tmp = tmp_sibling(path);

    let mut attempt = 0;
    let mut delay = BACKOFF;
    loop {
        attempt += 1;
        let result = std::fs::write(&tmp, &json)
            .and_then(|_| std::fs::rename(&tmp, path));
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < WRITE_ATTEMPTS => {
                eprintln!(
                    "Warning: [{}] write attempt {}/{} for {} failed: {}",
                    ErrorKind::SnapshotFailed,
                    attempt,
                    WRITE_ATTEMPTS,
                    path.display(),
                    e
                );
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(anyhow::anyhow!(
                    "[{}] giving up on {} after {} attempts: {}",
                    ErrorKind::SnapshotFailed,
                    path.display(),
                    WRITE_ATTEMPTS,
                    e
                ));
            }
        }
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}

impl GraphStore {
    /// Merge one language artifact back into the store during load.
    pub(crate) fn absorb_artifact(&mut self, artifact: LanguageArtifact) {
        let mut by_source: BTreeMap<String, Vec<Edge>> = BTreeMap::new();
        for edge in artifact.edges {
            by_source.entry(edge.source.clone()).or_default().push(edge);
        }
        for node in artifact.nodes {
            let edges = by_source.remove(&node.path).unwrap_or_default();
            self.insert_loaded(node, edges);
        }
    }
}
