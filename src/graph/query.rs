//! Query engine: bounded traversal, symbol search, hot paths, cycles.
//!
//! All traversals visit neighbors in sorted order so results are
//! deterministic for a given store state. Unknown starting files yield empty
//! results, not errors.

use crate::extract::EdgeKind;
use crate::graph::store::GraphStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// One row of a `find_related` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedFile {
    pub path: String,
    /// Edge kind name, prefixed with `reverse_` for reverse hops
    pub relationship: String,
    pub depth: usize,
    pub confidence: f64,
}

/// One row of a `search_symbols` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolHit {
    pub file: String,
    pub language: String,
    /// matched keywords / total keywords
    pub relevance: f64,
    pub matched_keywords: Vec<String>,
}

/// Composite architecture report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Overview {
    pub modules_by_language: BTreeMap<String, usize>,
    pub hot_paths: Vec<Vec<String>>,
    pub cycles: Vec<Vec<String>>,
    pub metrics: OverviewMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverviewMetrics {
    pub total_files: usize,
    pub total_edges: usize,
    /// Edges whose target never resolved to a repository file
    pub external_edges: usize,
}

/// Confidence decays 0.2 per hop from 1.0, floored at 0.1.
fn confidence_at(depth: usize) -> f64 {
    let decayed = 1.0 - 0.2 * (depth.saturating_sub(1) as f64);
    decayed.max(0.1)
}

/// BFS over edges matching `kinds`, optionally traversing the incoming
/// index as `reverse_<kind>` relationships.
///
/// The starting file itself is not returned. Results are sorted by
/// confidence (descending) then path. An unknown starting file yields an
/// empty result.
pub fn find_related(
    store: &GraphStore,
    file: &str,
    max_depth: usize,
    kinds: Option<&[EdgeKind]>,
    include_reverse: bool,
) -> Vec<RelatedFile> {
    if !store.contains(file) || max_depth == 0 {
        return Vec::new();
    }

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(file.to_string());
    let mut results: Vec<RelatedFile> = Vec::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((file.to_string(), 0));

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }

        // (neighbor, relationship) pairs in deterministic order
        let mut hops: Vec<(String, String)> = Vec::new();

        for edge in store.out_edges(&current, kinds) {
            if let Some(target) = edge.target.as_file() {
                if store.contains(target) {
                    hops.push((target.to_string(), edge.kind.name().to_string()));
                }
            }
        }
        if include_reverse {
            for edge in store.in_edges(&current, kinds) {
                hops.push((
                    edge.source.clone(),
                    format!("reverse_{}", edge.kind.name()),
                ));
            }
        }
        hops.sort();

        for (neighbor, relationship) in hops {
            if visited.contains(&neighbor) {
                continue;
            }
            visited.insert(neighbor.clone());
            results.push(RelatedFile {
                path: neighbor.clone(),
                relationship,
                depth: depth + 1,
                confidence: confidence_at(depth + 1),
            });
            queue.push_back((neighbor, depth + 1));
        }
    }

    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    results
}

/// Case-insensitive substring match over file paths and symbol names.
///
/// Relevance is the fraction of keywords the file matched. Files matching
/// no keyword are omitted.
pub fn search_symbols(store: &GraphStore, keywords: &[String]) -> Vec<SymbolHit> {
    if keywords.is_empty() {
        return Vec::new();
    }
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let total = lowered.len() as f64;

    let mut hits = Vec::new();
    for node in store.nodes() {
        let path_lower = node.path.to_lowercase();
        let symbols_lower: Vec<String> =
            node.symbols.iter().map(|s| s.name.to_lowercase()).collect();

        let mut matched = Vec::new();
        for (keyword, original) in lowered.iter().zip(keywords.iter()) {
            if path_lower.contains(keyword)
                || symbols_lower.iter().any(|s| s.contains(keyword))
            {
                matched.push(original.clone());
            }
        }

        if !matched.is_empty() {
            hits.push(SymbolHit {
                file: node.path.clone(),
                language: node.language.name().to_string(),
                relevance: matched.len() as f64 / total,
                matched_keywords: matched,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file.cmp(&b.file))
    });
    hits
}

/// Simple out-edge paths of length >= 2 starting at well-connected nodes.
///
/// A node qualifies as a start when its total degree (out plus resolved
/// incoming) is at least 3. DFS is bounded at depth 3. The top `limit`
/// paths by length are returned, ties broken lexicographically.
pub fn hot_paths(store: &GraphStore, limit: usize) -> Vec<Vec<String>> {
    const MIN_DEGREE: usize = 3;
    const MAX_DEPTH: usize = 3;

    let mut paths: Vec<Vec<String>> = Vec::new();

    for node in store.nodes() {
        let out_degree = store.out_edges(&node.path, None).count();
        let in_degree = store.in_edges(&node.path, None).count();
        if out_degree + in_degree < MIN_DEGREE {
            continue;
        }

        let mut current = vec![node.path.clone()];
        collect_paths(store, &mut current, MAX_DEPTH, &mut paths);
    }

    paths.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    paths.truncate(limit);
    paths
}

fn collect_paths(
    store: &GraphStore,
    current: &mut Vec<String>,
    remaining: usize,
    paths: &mut Vec<Vec<String>>,
) {
    if remaining == 0 {
        return;
    }
    let last = current.last().cloned().unwrap_or_default();

    let mut targets: Vec<String> = store
        .out_edges(&last, None)
        .filter_map(|edge| edge.target.as_file())
        .filter(|target| store.contains(target))
        .map(|target| target.to_string())
        .collect();
    targets.sort();
    targets.dedup();

    for target in targets {
        if current.contains(&target) {
            continue;
        }
        current.push(target);
        if current.len() >= 3 {
            paths.push(current.clone());
        }
        collect_paths(store, current, remaining - 1, paths);
        current.pop();
    }
}

/// Enumerate cycles with a recursion-stack DFS over sorted nodes.
///
/// A back-edge to a node on the current stack emits the stack slice from
/// that node to the current one. Each maximal cycle is reported once.
pub fn detect_cycles(store: &GraphStore) -> Vec<Vec<String>> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut cycles: Vec<Vec<String>> = Vec::new();

    for node in store.nodes() {
        if !visited.contains(&node.path) {
            let mut stack: Vec<String> = Vec::new();
            let mut on_stack: HashMap<String, usize> = HashMap::new();
            dfs_cycles(
                store,
                &node.path,
                &mut visited,
                &mut stack,
                &mut on_stack,
                &mut cycles,
            );
        }
    }

    cycles
}

fn dfs_cycles(
    store: &GraphStore,
    node: &str,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
    on_stack: &mut HashMap<String, usize>,
    cycles: &mut Vec<Vec<String>>,
) {
    visited.insert(node.to_string());
    on_stack.insert(node.to_string(), stack.len());
    stack.push(node.to_string());

    let mut targets: Vec<String> = store
        .out_edges(node, None)
        .filter_map(|edge| edge.target.as_file())
        .filter(|target| store.contains(target))
        .map(|target| target.to_string())
        .collect();
    targets.sort();
    targets.dedup();

    for target in targets {
        if let Some(&pos) = on_stack.get(&target) {
            // Back edge: the slice from the ancestor to here is one cycle
            cycles.push(stack[pos..].to_vec());
        } else if !visited.contains(&target) {
            dfs_cycles(store, &target, visited, stack, on_stack, cycles);
        }
    }

    stack.pop();
    on_stack.remove(node);
}

/// Composite report for the `overview` verb.
pub fn architecture_overview(store: &GraphStore) -> Overview {
    let external_edges = store
        .edges()
        .filter(|edge| edge.target.as_file().is_none())
        .count();

    Overview {
        modules_by_language: store.language_counts(),
        hot_paths: hot_paths(store, 10),
        cycles: detect_cycles(store),
        metrics: OverviewMetrics {
            total_files: store.node_count(),
            total_edges: store.edge_count(),
            external_edges,
        },
    }
}

/// Whether the resolved-edge graph admits a topological order.
///
/// Used by tests: `detect_cycles` returns empty iff this is true.
pub fn has_topological_order(store: &GraphStore) -> bool {
    let mut indegree: BTreeMap<&str, usize> = store.nodes().map(|n| (n.path.as_str(), 0)).collect();
    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for edge in store.edges() {
        if let Some(target) = edge.target.as_file() {
            if store.contains(target) && store.contains(&edge.source) {
                if adjacency
                    .entry(edge.source.as_str())
                    .or_default()
                    .insert(target)
                {
                    *indegree.entry(target).or_insert(0) += 1;
                }
            }
        }
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut seen = 0;

    while let Some(node) = ready.pop() {
        seen += 1;
        if let Some(targets) = adjacency.get(node) {
            for target in targets {
                let d = indegree.get_mut(target).expect("target in indegree map");
                *d -= 1;
                if *d == 0 {
                    ready.push(target);
                }
            }
        }
    }

    seen == indegree.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_file, Language};
    use std::time::Duration;

    fn apply(store: &mut GraphStore, file: &str, lang: Language, source: &[u8]) {
        let (record, warning) = extract_file(file, lang, source, Duration::from_secs(10));
        assert!(warning.is_none());
        store.apply_record(&record);
        store.resolve_pending();
    }

    fn js_pair() -> GraphStore {
        let mut store = GraphStore::new();
        apply(&mut store, "b.js", Language::JavaScript, b"");
        apply(&mut store, "a.js", Language::JavaScript, b"import './b.js';\n");
        store
    }

    #[test]
    fn related_direct_import() {
        let store = js_pair();
        let related = find_related(&store, "a.js", 1, None, false);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].path, "b.js");
        assert_eq!(related[0].relationship, "import");
        assert_eq!(related[0].depth, 1);
        assert!((related[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn related_reverse_import() {
        let store = js_pair();
        let related = find_related(&store, "b.js", 1, None, true);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].path, "a.js");
        assert_eq!(related[0].relationship, "reverse_import");
        assert_eq!(related[0].depth, 1);
    }

    #[test]
    fn related_unknown_file_is_empty() {
        let store = js_pair();
        assert!(find_related(&store, "missing.js", 3, None, true).is_empty());
    }

    #[test]
    fn related_depth_and_confidence_decay() {
        let mut store = GraphStore::new();
        apply(&mut store, "z.py", Language::Python, b"");
        apply(&mut store, "y.py", Language::Python, b"import z\n");
        apply(&mut store, "x.py", Language::Python, b"import y\n");

        let related = find_related(&store, "x.py", 3, None, false);
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].path, "y.py");
        assert_eq!(related[0].depth, 1);
        assert!((related[0].confidence - 1.0).abs() < 1e-9);
        assert_eq!(related[1].path, "z.py");
        assert_eq!(related[1].depth, 2);
        assert!((related[1].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn related_depth_limit_is_honored() {
        let mut store = GraphStore::new();
        apply(&mut store, "z.py", Language::Python, b"");
        apply(&mut store, "y.py", Language::Python, b"import z\n");
        apply(&mut store, "x.py", Language::Python, b"import y\n");

        let related = find_related(&store, "x.py", 1, None, false);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].path, "y.py");
    }

    #[test]
    fn related_kind_filter() {
        let mut store = GraphStore::new();
        apply(&mut store, "b.js", Language::JavaScript, b"");
        apply(
            &mut store,
            "a.js",
            Language::JavaScript,
            b"const b = require('./b');\n",
        );
        assert!(find_related(&store, "a.js", 1, Some(&[EdgeKind::Import]), false).is_empty());
        let related = find_related(&store, "a.js", 1, Some(&[EdgeKind::Require]), false);
        assert_eq!(related.len(), 1);
    }

    #[test]
    fn confidence_floor() {
        assert!((confidence_at(1) - 1.0).abs() < 1e-9);
        assert!((confidence_at(2) - 0.8).abs() < 1e-9);
        assert!((confidence_at(6) - 0.1).abs() < 1e-9);
        assert!((confidence_at(40) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn symbol_search_matches_paths_and_symbols() {
        let mut store = GraphStore::new();
        apply(
            &mut store,
            "src/auth/login.py",
            Language::Python,
            b"def authenticate():\n    pass\n",
        );
        apply(&mut store, "src/db.py", Language::Python, b"def connect():\n    pass\n");

        let hits = search_symbols(
            &store,
            &["login".to_string(), "authenticate".to_string()],
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file, "src/auth/login.py");
        assert!((hits[0].relevance - 1.0).abs() < 1e-9);
        assert_eq!(hits[0].matched_keywords.len(), 2);
    }

    #[test]
    fn symbol_search_is_case_insensitive() {
        let mut store = GraphStore::new();
        apply(
            &mut store,
            "server.py",
            Language::Python,
            b"class HTTPServer:\n    pass\n",
        );
        let hits = search_symbols(&store, &["httpserver".to_string()]);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn symbol_search_partial_relevance() {
        let mut store = GraphStore::new();
        apply(&mut store, "cache.py", Language::Python, b"");
        let hits = search_symbols(&store, &["cache".to_string(), "missing".to_string()]);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].relevance - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cycle_detection_finds_triangle() {
        let mut store = GraphStore::new();
        apply(&mut store, "x.py", Language::Python, b"import y\n");
        apply(&mut store, "y.py", Language::Python, b"import z\n");
        apply(&mut store, "z.py", Language::Python, b"import x\n");

        let cycles = detect_cycles(&store);
        assert_eq!(cycles.len(), 1);
        let cycle: BTreeSet<&str> = cycles[0].iter().map(|s| s.as_str()).collect();
        assert_eq!(
            cycle,
            BTreeSet::from(["x.py", "y.py", "z.py"])
        );
        // DFS starts at the lexicographically first node
        assert_eq!(cycles[0][0], "x.py");
    }

    #[test]
    fn acyclic_store_has_no_cycles_and_topo_order() {
        let mut store = GraphStore::new();
        apply(&mut store, "z.py", Language::Python, b"");
        apply(&mut store, "y.py", Language::Python, b"import z\n");
        apply(&mut store, "x.py", Language::Python, b"import y\nimport z\n");

        assert!(detect_cycles(&store).is_empty());
        assert!(has_topological_order(&store));
    }

    #[test]
    fn cyclic_store_has_no_topo_order() {
        let mut store = GraphStore::new();
        apply(&mut store, "a.py", Language::Python, b"import b\n");
        apply(&mut store, "b.py", Language::Python, b"import a\n");
        assert!(!detect_cycles(&store).is_empty());
        assert!(!has_topological_order(&store));
    }

    #[test]
    fn self_import_is_single_node_cycle() {
        let mut store = GraphStore::new();
        apply(&mut store, "a.py", Language::Python, b"import a\n");
        let cycles = detect_cycles(&store);
        assert_eq!(cycles, vec![vec!["a.py".to_string()]]);
    }

    #[test]
    fn hot_paths_require_connected_start() {
        let mut store = GraphStore::new();
        // hub imports three files; chain continues below
        apply(&mut store, "d.py", Language::Python, b"");
        apply(&mut store, "c.py", Language::Python, b"import d\n");
        apply(&mut store, "b.py", Language::Python, b"import c\n");
        apply(
            &mut store,
            "hub.py",
            Language::Python,
            b"import b\nimport c\nimport d\n",
        );

        let paths = hot_paths(&store, 10);
        assert!(!paths.is_empty());
        // Longest path from the hub: hub -> b -> c -> d
        assert_eq!(
            paths[0],
            vec![
                "hub.py".to_string(),
                "b.py".to_string(),
                "c.py".to_string(),
                "d.py".to_string()
            ]
        );
        // Every reported path has at least two edges
        assert!(paths.iter().all(|p| p.len() >= 3));
    }

    #[test]
    fn hot_paths_empty_for_sparse_graph() {
        let store = js_pair();
        assert!(hot_paths(&store, 10).is_empty());
    }

    #[test]
    fn overview_on_empty_store_is_well_formed() {
        let store = GraphStore::new();
        let overview = architecture_overview(&store);
        assert!(overview.modules_by_language.is_empty());
        assert!(overview.hot_paths.is_empty());
        assert!(overview.cycles.is_empty());
        assert_eq!(overview.metrics.total_files, 0);
        assert_eq!(overview.metrics.total_edges, 0);
    }

    #[test]
    fn overview_counts_languages_and_external_edges() {
        let mut store = GraphStore::new();
        apply(&mut store, "a.py", Language::Python, b"import os\n");
        apply(&mut store, "b.js", Language::JavaScript, b"");

        let overview = architecture_overview(&store);
        assert_eq!(overview.modules_by_language.get("python"), Some(&1));
        assert_eq!(overview.modules_by_language.get("javascript"), Some(&1));
        assert_eq!(overview.metrics.total_files, 2);
        assert_eq!(overview.metrics.external_edges, 1);
    }
}
