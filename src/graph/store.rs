//! In-memory directed multigraph keyed by repository-relative file path.
//!
//! The store owns every node and edge record. Mutation happens through a
//! small set of operations with a strict contract: replacing a file's
//! out-edges is atomic (callers hold the write side of the daemon's
//! `RwLock`, so readers observe either the old or the new neighborhood,
//! never a mix), and target resolution only ever upgrades external targets
//! to file targets.

use crate::extract::{EdgeKind, ExtractionRecord, Language, RawEdge, ResolveHint, SymbolRecord};
use crate::graph::resolve;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// A known source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileNode {
    /// Repository-relative path (forward slashes, no `./`)
    pub path: String,
    pub language: Language,
    /// Unix seconds of the last applied extraction
    pub last_scan: u64,
    /// SHA-256 of the contents at last extraction
    pub content_hash: String,
    /// Top-level definitions, for symbol search
    pub symbols: Vec<SymbolRecord>,
}

/// Resolution state of an edge target.
///
/// `File` points at a node path; whether that node currently exists decides
/// staleness at read time. `External` keeps the raw identifier visible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Target {
    File(String),
    External(String),
}

impl Target {
    pub fn as_file(&self) -> Option<&str> {
        match self {
            Target::File(path) => Some(path),
            Target::External(_) => None,
        }
    }
}

/// A directed, typed, weighted edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    /// Target as written in the source file
    pub raw: String,
    pub target: Target,
    pub kind: EdgeKind,
    /// Accumulated observation count for this (source, raw, kind)
    pub weight: u32,
    /// 1-indexed line of the first observation
    pub line: usize,
    pub hint: ResolveHint,
}

/// Outcome of an `apply_record` or `remove_file` operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<Edge>,
    pub removed: Vec<Edge>,
    pub unchanged: Vec<Edge>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The in-memory graph store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GraphStore {
    nodes: BTreeMap<String, FileNode>,
    /// Out-edges keyed by source path; replaced wholesale per apply
    out: BTreeMap<String, Vec<Edge>>,
    /// Incoming index: resolved target path -> set of source paths
    #[serde(default)]
    incoming: BTreeMap<String, BTreeSet<String>>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.out.values().map(|edges| edges.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, path: &str) -> Option<&FileNode> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// All nodes in path order.
    pub fn nodes(&self) -> impl Iterator<Item = &FileNode> {
        self.nodes.values()
    }

    /// All edges in source-path order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.out.values().flatten()
    }

    /// Whether a resolved edge target currently dangles (its file node was
    /// removed after the edge was created).
    pub fn is_stale(&self, edge: &Edge) -> bool {
        match &edge.target {
            Target::File(path) => !self.nodes.contains_key(path),
            Target::External(_) => false,
        }
    }

    /// Out-edges of a file, optionally filtered by kind.
    pub fn out_edges<'a>(
        &'a self,
        path: &str,
        kinds: Option<&'a [EdgeKind]>,
    ) -> impl Iterator<Item = &'a Edge> {
        self.out
            .get(path)
            .into_iter()
            .flatten()
            .filter(move |edge| kinds.map_or(true, |ks| ks.contains(&edge.kind)))
    }

    /// Incoming edges whose resolved target is `path`, in source order.
    pub fn in_edges<'a>(
        &'a self,
        path: &'a str,
        kinds: Option<&'a [EdgeKind]>,
    ) -> impl Iterator<Item = &'a Edge> {
        self.incoming
            .get(path)
            .into_iter()
            .flatten()
            .filter_map(move |source| self.out.get(source))
            .flatten()
            .filter(move |edge| edge.target.as_file() == Some(path))
            .filter(move |edge| kinds.map_or(true, |ks| ks.contains(&edge.kind)))
    }

    /// Atomically replace all out-edges sourced at `record.file`.
    ///
    /// Duplicate (kind, target) observations in the record accumulate into
    /// edge weight. Targets are resolved against the current node set; a
    /// target naming a file that arrives later in the batch is picked up by
    /// the post-batch [`GraphStore::resolve_pending`] sweep.
    pub fn apply_record(&mut self, record: &ExtractionRecord) -> ChangeSet {
        let path = record.file.clone();

        let node = FileNode {
            path: path.clone(),
            language: record.language,
            last_scan: now_secs(),
            content_hash: record.content_hash.clone(),
            symbols: record.symbols.clone(),
        };

        let new_edges = self.build_edges(&path, record.language, &record.edges);
        let old_edges = self.out.remove(&path).unwrap_or_default();
        self.unindex_incoming(&path, &old_edges);

        let mut changes = ChangeSet::default();
        let new_keys: BTreeSet<(EdgeKind, String)> = new_edges
            .iter()
            .map(|e| (e.kind, e.raw.clone()))
            .collect();
        let old_keys: BTreeSet<(EdgeKind, String)> = old_edges
            .iter()
            .map(|e| (e.kind, e.raw.clone()))
            .collect();

        for edge in &old_edges {
            if !new_keys.contains(&(edge.kind, edge.raw.clone())) {
                changes.removed.push(edge.clone());
            }
        }
        for edge in &new_edges {
            if old_keys.contains(&(edge.kind, edge.raw.clone())) {
                changes.unchanged.push(edge.clone());
            } else {
                changes.added.push(edge.clone());
            }
        }

        self.index_incoming(&path, &new_edges);
        self.out.insert(path.clone(), new_edges);
        self.nodes.insert(path, node);

        changes
    }

    /// Remove a file node and its out-edges.
    ///
    /// Incoming edges are preserved; they read as stale until the file is
    /// re-created (at which point they resolve to the new node again with
    /// no further work, since staleness is computed at read time).
    pub fn remove_file(&mut self, path: &str) -> ChangeSet {
        let mut changes = ChangeSet::default();
        if let Some(old_edges) = self.out.remove(path) {
            self.unindex_incoming(path, &old_edges);
            changes.removed = old_edges;
        }
        self.nodes.remove(path);
        changes
    }

    /// Re-attempt resolution of every still-external edge against the
    /// current node set. Runs once after each batch so files added earlier
    /// in the batch satisfy later files' targets (monotonic resolution).
    ///
    /// Returns the number of edges upgraded.
    pub fn resolve_pending(&mut self) -> usize {
        let mut upgrades: Vec<(String, usize, String)> = Vec::new();

        for (source, edges) in &self.out {
            let language = match self.nodes.get(source) {
                Some(node) => node.language,
                None => continue,
            };
            for (idx, edge) in edges.iter().enumerate() {
                if matches!(edge.target, Target::External(_)) && edge.hint != ResolveHint::Never {
                    if let Some(resolved) =
                        resolve::resolve_target(&self.nodes, source, &edge.raw, edge.hint, language)
                    {
                        upgrades.push((source.clone(), idx, resolved));
                    }
                }
            }
        }

        let count = upgrades.len();
        for (source, idx, resolved) in upgrades {
            self.incoming
                .entry(resolved.clone())
                .or_default()
                .insert(source.clone());
            if let Some(edges) = self.out.get_mut(&source) {
                if let Some(edge) = edges.get_mut(idx) {
                    edge.target = Target::File(resolved);
                }
            }
        }
        count
    }

    /// Deduplicate raw edges into weighted edges and resolve their targets
    /// against the current node set.
    fn build_edges(&self, source: &str, language: Language, raw_edges: &[RawEdge]) -> Vec<Edge> {
        let mut merged: BTreeMap<(EdgeKind, String), Edge> = BTreeMap::new();

        for raw in raw_edges {
            let key = (raw.kind, raw.target.clone());
            match merged.entry(key) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().weight += 1;
                }
                Entry::Vacant(entry) => {
                    let target = if raw.hint == ResolveHint::Never {
                        Target::External(raw.target.clone())
                    } else {
                        match resolve::resolve_target(
                            &self.nodes,
                            source,
                            &raw.target,
                            raw.hint,
                            language,
                        ) {
                            Some(path) => Target::File(path),
                            None => Target::External(raw.target.clone()),
                        }
                    };
                    entry.insert(Edge {
                        source: source.to_string(),
                        raw: raw.target.clone(),
                        target,
                        kind: raw.kind,
                        weight: 1,
                        line: raw.line,
                        hint: raw.hint,
                    });
                }
            }
        }

        merged.into_values().collect()
    }

    fn index_incoming(&mut self, source: &str, edges: &[Edge]) {
        for edge in edges {
            if let Target::File(path) = &edge.target {
                self.incoming
                    .entry(path.clone())
                    .or_default()
                    .insert(source.to_string());
            }
        }
    }

    fn unindex_incoming(&mut self, source: &str, edges: &[Edge]) {
        for edge in edges {
            if let Target::File(path) = &edge.target {
                let mut empty = false;
                if let Some(sources) = self.incoming.get_mut(path) {
                    sources.remove(source);
                    empty = sources.is_empty();
                }
                if empty {
                    self.incoming.remove(path);
                }
            }
        }
    }

    /// Insert a node and its out-edges verbatim during snapshot load.
    ///
    /// Skips resolution and delta computation; the caller rebuilds the
    /// incoming index once after all artifacts are absorbed.
    pub(crate) fn insert_loaded(&mut self, node: FileNode, edges: Vec<Edge>) {
        self.out.insert(node.path.clone(), edges);
        self.nodes.insert(node.path.clone(), node);
    }

    /// Rebuild the incoming index from the out-edge map. Used after
    /// deserializing a snapshot written without the index.
    pub fn rebuild_incoming(&mut self) {
        self.incoming.clear();
        let pairs: Vec<(String, String)> = self
            .out
            .iter()
            .flat_map(|(source, edges)| {
                edges.iter().filter_map(move |edge| {
                    edge.target
                        .as_file()
                        .map(|target| (target.to_string(), source.clone()))
                })
            })
            .collect();
        for (target, source) in pairs {
            self.incoming.entry(target).or_default().insert(source);
        }
    }

    /// File counts per language name, for metrics and the overview.
    pub fn language_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.language.name().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_file, Language};
    use std::time::Duration;

    fn record_for(file: &str, lang: Language, source: &[u8]) -> ExtractionRecord {
        let (record, warning) = extract_file(file, lang, source, Duration::from_secs(10));
        assert!(warning.is_none());
        record
    }

    fn apply(store: &mut GraphStore, file: &str, lang: Language, source: &[u8]) -> ChangeSet {
        let record = record_for(file, lang, source);
        let changes = store.apply_record(&record);
        store.resolve_pending();
        changes
    }

    #[test]
    fn apply_creates_node_and_edges() {
        let mut store = GraphStore::new();
        apply(&mut store, "b.js", Language::JavaScript, b"");
        let changes = apply(
            &mut store,
            "a.js",
            Language::JavaScript,
            b"import './b.js';\n",
        );

        assert_eq!(store.node_count(), 2);
        assert_eq!(changes.added.len(), 1);
        let edge = &changes.added[0];
        assert_eq!(edge.kind, EdgeKind::Import);

        let out: Vec<&Edge> = store.out_edges("a.js", None).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, Target::File("b.js".to_string()));
    }

    #[test]
    fn reapply_replaces_edges_atomically() {
        let mut store = GraphStore::new();
        apply(&mut store, "b.py", Language::Python, b"");
        apply(&mut store, "c.py", Language::Python, b"");
        apply(&mut store, "a.py", Language::Python, b"import b\n");

        let changes = apply(&mut store, "a.py", Language::Python, b"import c\n");
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.removed.len(), 1);
        assert_eq!(changes.removed[0].raw, "b");

        let out: Vec<&Edge> = store.out_edges("a.py", None).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, Target::File("c.py".to_string()));
    }

    #[test]
    fn unchanged_edges_are_reported() {
        let mut store = GraphStore::new();
        apply(&mut store, "b.py", Language::Python, b"");
        apply(&mut store, "a.py", Language::Python, b"import b\n");
        let changes = apply(
            &mut store,
            "a.py",
            Language::Python,
            b"import b\nimport os\n",
        );
        assert_eq!(changes.unchanged.len(), 1);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].raw, "os");
    }

    #[test]
    fn repeated_observation_accumulates_weight() {
        let mut store = GraphStore::new();
        apply(&mut store, "h.c", Language::C, b"");
        let source = b"void a(void) { helper(); }\nvoid b(void) { helper(); }\n";
        apply(&mut store, "m.c", Language::C, source);

        let out: Vec<&Edge> = store.out_edges("m.c", None).collect();
        let call = out.iter().find(|e| e.kind == EdgeKind::Call).unwrap();
        assert_eq!(call.weight, 2);
    }

    #[test]
    fn batch_resolution_is_monotonic() {
        let mut store = GraphStore::new();
        // a.py imports b before b exists
        let record = record_for("a.py", Language::Python, b"import b\n");
        store.apply_record(&record);
        let out: Vec<Edge> = store.out_edges("a.py", None).cloned().collect();
        assert_eq!(out[0].target, Target::External("b".to_string()));

        // b arrives later in the batch; the sweep resolves the edge
        let record_b = record_for("b.py", Language::Python, b"");
        store.apply_record(&record_b);
        let upgraded = store.resolve_pending();
        assert_eq!(upgraded, 1);

        let out: Vec<Edge> = store.out_edges("a.py", None).cloned().collect();
        assert_eq!(out[0].target, Target::File("b.py".to_string()));
    }

    #[test]
    fn remove_file_preserves_incoming_as_stale() {
        let mut store = GraphStore::new();
        apply(&mut store, "b.js", Language::JavaScript, b"");
        apply(&mut store, "a.js", Language::JavaScript, b"import './b';\n");

        store.remove_file("b.js");
        assert!(!store.contains("b.js"));

        let out: Vec<Edge> = store.out_edges("a.js", None).cloned().collect();
        assert_eq!(out.len(), 1);
        assert!(store.is_stale(&out[0]));

        // Re-creating the file clears staleness with no edge rewrite
        apply(&mut store, "b.js", Language::JavaScript, b"");
        let out: Vec<Edge> = store.out_edges("a.js", None).cloned().collect();
        assert!(!store.is_stale(&out[0]));
    }

    #[test]
    fn in_edges_follow_resolution() {
        let mut store = GraphStore::new();
        apply(&mut store, "b.py", Language::Python, b"");
        apply(&mut store, "a.py", Language::Python, b"import b\n");
        apply(&mut store, "c.py", Language::Python, b"import b\n");

        let sources: Vec<&str> = store.in_edges("b.py", None).map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["a.py", "c.py"]);
    }

    #[test]
    fn idempotent_replay_yields_same_edges() {
        let mut store = GraphStore::new();
        let source = b"import os\nimport sys\n";
        apply(&mut store, "a.py", Language::Python, source);
        let first: Vec<Edge> = store.out_edges("a.py", None).cloned().collect();

        let changes = apply(&mut store, "a.py", Language::Python, source);
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
        let second: Vec<Edge> = store.out_edges("a.py", None).cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn rebuild_incoming_matches_incremental_index() {
        let mut store = GraphStore::new();
        apply(&mut store, "b.py", Language::Python, b"");
        apply(&mut store, "a.py", Language::Python, b"import b\n");

        let mut rebuilt = store.clone();
        rebuilt.rebuild_incoming();
        let a: Vec<&str> = store.in_edges("b.py", None).map(|e| e.source.as_str()).collect();
        let b: Vec<&str> = rebuilt.in_edges("b.py", None).map(|e| e.source.as_str()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn language_counts_reflect_nodes() {
        let mut store = GraphStore::new();
        apply(&mut store, "a.py", Language::Python, b"");
        apply(&mut store, "b.py", Language::Python, b"");
        apply(&mut store, "c.js", Language::JavaScript, b"");
        let counts = store.language_counts();
        assert_eq!(counts.get("python"), Some(&2));
        assert_eq!(counts.get("javascript"), Some(&1));
    }
}
