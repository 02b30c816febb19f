//! Community detection and the super-graph.
//!
//! Compresses the file-level graph into a bounded set of clusters so the
//! whole repository structure fits in one screen. Small projects skip
//! community detection entirely; larger ones run an iterative Louvain-like
//! optimization with an `internal/degree` score, then shape the result to a
//! target count with a `misc` absorber. When the optimization makes no
//! progress (empty or trivially disconnected graphs) the fallback partition
//! is by directory prefix.

use crate::config::Config;
use crate::graph::store::GraphStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum Louvain passes before giving up on convergence.
const MAX_ITERATIONS: usize = 10;

/// The absorbing cluster for residual files.
pub const MISC_CLUSTER: &str = "misc";

/// Per-cluster summary plus membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterInfo {
    /// Member count
    pub size: usize,
    /// Heuristic size estimate (50 lines per member)
    pub estimated_lines: usize,
    /// Sorted unique language names
    pub languages: Vec<String>,
    /// Up to three files ranked by the importance heuristic
    pub key_files: Vec<String>,
    /// Short human-oriented description
    pub description: String,
    /// All member paths, sorted
    pub files: Vec<String>,
}

/// Directed inter-cluster edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuperEdge {
    pub from: String,
    pub to: String,
    /// Count of file-level edges crossing the partition
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuperGraphMeta {
    pub total_files: usize,
    pub total_clusters: usize,
    pub compression_ratio: f64,
    /// Unix seconds when the super-graph was computed
    pub timestamp: u64,
    /// "single_file", "louvain", or "directory"
    pub strategy: String,
}

/// The quotient graph: clusters, inter-cluster edges, metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuperGraph {
    pub clusters: BTreeMap<String, ClusterInfo>,
    pub edges: Vec<SuperEdge>,
    pub metadata: SuperGraphMeta,
}

impl SuperGraph {
    pub fn empty() -> Self {
        SuperGraph {
            clusters: BTreeMap::new(),
            edges: Vec::new(),
            metadata: SuperGraphMeta {
                total_files: 0,
                total_clusters: 0,
                compression_ratio: 1.0,
                timestamp: now_secs(),
                strategy: "single_file".to_string(),
            },
        }
    }

    /// Cluster id for a file, if the file was part of the clustering run.
    pub fn cluster_of(&self, path: &str) -> Option<&str> {
        self.clusters
            .iter()
            .find(|(_, info)| info.files.binary_search(&path.to_string()).is_ok())
            .map(|(id, _)| id.as_str())
    }
}

/// Regeneration policy: re-cluster when the node count drifted more than 5%
/// since the last run (or when no run has happened yet).
pub fn needs_recluster(last_node_count: Option<usize>, current: usize) -> bool {
    match last_node_count {
        None => true,
        Some(last) => {
            let base = last.max(1) as f64;
            let drift = (current as f64 - last as f64).abs() / base;
            drift > 0.05
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Build the super-graph for the current store contents.
pub fn build_supergraph(store: &GraphStore, config: &Config) -> SuperGraph {
    let paths: Vec<String> = store.nodes().map(|n| n.path.clone()).collect();
    let n = paths.len();

    if n == 0 {
        return SuperGraph::empty();
    }

    if n < config.small_project_threshold {
        return single_file_clusters(store, &paths);
    }

    let undirected = undirected_view(store);
    let (membership, strategy) = match louvain(&paths, &undirected, config.resolution) {
        Some(communities) => (communities, "louvain"),
        None => (directory_partition(&paths), "directory"),
    };

    let shaped = shape_clusters(&paths, membership, config);
    assemble_named(store, shaped, strategy)
}

/// Every file its own cluster; super-edges are the file-level edges.
fn single_file_clusters(store: &GraphStore, paths: &[String]) -> SuperGraph {
    let mut ordered = paths.to_vec();
    ordered.sort();

    let named: Vec<(String, Vec<String>)> = ordered
        .iter()
        .enumerate()
        .map(|(idx, path)| (format!("c{}", idx), vec![path.clone()]))
        .collect();

    let mut graph = assemble_named(store, named, "single_file");
    graph.metadata.compression_ratio = 1.0;
    graph
}

/// Undirected weighted projection: one unit of weight per directed edge
/// record between two distinct, currently-known files.
fn undirected_view(store: &GraphStore) -> HashMap<(String, String), u32> {
    let mut weights: HashMap<(String, String), u32> = HashMap::new();
    for edge in store.edges() {
        let Some(target) = edge.target.as_file() else {
            continue;
        };
        if !store.contains(target) || !store.contains(&edge.source) {
            continue;
        }
        if edge.source == target {
            continue;
        }
        let (a, b) = if edge.source.as_str() < target {
            (edge.source.clone(), target.to_string())
        } else {
            (target.to_string(), edge.source.clone())
        };
        *weights.entry((a, b)).or_insert(0) += 1;
    }
    weights
}

/// Iterative Louvain-like optimization.
///
/// Each node starts in its own community. In deterministic (sorted) order,
/// every node compares `internal_edges(node, community) / degree(node)` for
/// its current community against each neighbor community, moving when the
/// best alternative beats the current score scaled by the resolution
/// factor. Stops when a full pass moves nothing.
///
/// Returns None when no node ever moved: the partition is still the trivial
/// one and the caller should fall back to directory clustering.
fn louvain(
    paths: &[String],
    undirected: &HashMap<(String, String), u32>,
    resolution: f64,
) -> Option<HashMap<String, usize>> {
    let mut ordered = paths.to_vec();
    ordered.sort();

    let mut communities: HashMap<String, usize> = ordered
        .iter()
        .enumerate()
        .map(|(idx, path)| (path.clone(), idx))
        .collect();

    // Per-node adjacency with weights
    let mut neighbors: HashMap<&str, Vec<(&str, u32)>> = HashMap::new();
    for ((a, b), weight) in undirected {
        neighbors.entry(a.as_str()).or_default().push((b.as_str(), *weight));
        neighbors.entry(b.as_str()).or_default().push((a.as_str(), *weight));
    }
    for list in neighbors.values_mut() {
        list.sort();
    }

    let degree: HashMap<&str, u32> = ordered
        .iter()
        .map(|path| {
            let d = neighbors
                .get(path.as_str())
                .map(|list| list.iter().map(|(_, w)| *w).sum())
                .unwrap_or(0);
            (path.as_str(), d)
        })
        .collect();

    let mut any_move = false;
    for _ in 0..MAX_ITERATIONS {
        let mut moved = false;

        for path in &ordered {
            let node_degree = degree[path.as_str()];
            if node_degree == 0 {
                continue;
            }
            let Some(adjacent) = neighbors.get(path.as_str()) else {
                continue;
            };

            // Weight into each adjacent community
            let mut into_community: BTreeMap<usize, u32> = BTreeMap::new();
            for (neighbor, weight) in adjacent {
                let community = communities[*neighbor];
                *into_community.entry(community).or_insert(0) += weight;
            }

            let current = communities[path.as_str()];
            let current_score =
                *into_community.get(&current).unwrap_or(&0) as f64 / node_degree as f64;

            let mut best = current;
            let mut best_score = current_score;
            for (&community, &weight) in &into_community {
                if community == current {
                    continue;
                }
                let score = weight as f64 / node_degree as f64;
                if score > best_score {
                    best = community;
                    best_score = score;
                }
            }

            if best != current && best_score > current_score * resolution {
                communities.insert(path.clone(), best);
                moved = true;
                any_move = true;
            }
        }

        if !moved {
            break;
        }
    }

    if any_move {
        Some(communities)
    } else {
        None
    }
}

/// Fallback: the first two path segments form the cluster key.
fn directory_partition(paths: &[String]) -> HashMap<String, usize> {
    let mut keys: BTreeMap<String, usize> = BTreeMap::new();
    let mut membership: HashMap<String, usize> = HashMap::new();

    let mut ordered = paths.to_vec();
    ordered.sort();

    for path in &ordered {
        let segments: Vec<&str> = path.split('/').collect();
        let key = if segments.len() >= 3 {
            format!("{}/{}", segments[0], segments[1])
        } else if segments.len() == 2 {
            segments[0].to_string()
        } else {
            ".".to_string()
        };
        let next = keys.len();
        let id = *keys.entry(key).or_insert(next);
        membership.insert(path.clone(), id);
    }

    membership
}

/// Shape raw communities into named clusters: sort by size, enforce the
/// target/max counts, absorb residuals into `misc`.
fn shape_clusters(
    paths: &[String],
    membership: HashMap<String, usize>,
    config: &Config,
) -> Vec<(String, Vec<String>)> {
    let n = paths.len();
    let target = (n.div_ceil(config.target_reduction)).max(5);
    let max = (2 * target).min(config.max_clusters);

    // Group members per community, sorted for determinism
    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for path in paths {
        let community = membership.get(path).copied().unwrap_or(usize::MAX);
        groups.entry(community).or_default().push(path.clone());
    }
    let mut communities: Vec<Vec<String>> = groups
        .into_values()
        .map(|mut members| {
            members.sort();
            members
        })
        .collect();
    // Size descending, ties by first member path
    communities.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.first().cmp(&b.first()))
    });

    let mut kept: Vec<Vec<String>> = Vec::new();
    let mut misc: Vec<String> = Vec::new();

    if communities.len() > max {
        let keep = target.saturating_sub(1);
        for (idx, community) in communities.into_iter().enumerate() {
            if idx < keep {
                kept.push(community);
            } else {
                misc.extend(community);
            }
        }
    } else {
        for community in communities {
            if community.len() >= config.min_cluster_size {
                kept.push(community);
            } else {
                misc.extend(community);
            }
        }
    }

    let mut named: Vec<(String, Vec<String>)> = kept
        .into_iter()
        .enumerate()
        .map(|(idx, members)| (format!("c{}", idx), members))
        .collect();
    if !misc.is_empty() {
        misc.sort();
        named.push((MISC_CLUSTER.to_string(), misc));
    }
    named
}

/// Importance heuristic for key files: shorter paths score higher, entry
/// points score a bonus, tests and dunder files score negative.
fn importance(path: &str) -> i64 {
    let mut score = 100 - path.len() as i64;
    let lower = path.to_lowercase();
    let filename = lower.rsplit('/').next().unwrap_or(&lower);
    if filename.contains("index") || filename.contains("main") {
        score += 25;
    }
    if lower.contains("test") || filename.starts_with("__") {
        score -= 50;
    }
    score
}

fn describe(members: &[String], languages: &[String]) -> String {
    let mut prefix_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for member in members {
        let prefix = match member.find('/') {
            Some(idx) => &member[..idx],
            None => ".",
        };
        *prefix_counts.entry(prefix).or_insert(0) += 1;
    }
    let mut prefixes: Vec<(&str, usize)> = prefix_counts.into_iter().collect();
    prefixes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let top: Vec<&str> = prefixes.iter().take(2).map(|(p, _)| *p).collect();

    format!(
        "{} files under {} ({})",
        members.len(),
        top.join(", "),
        languages.join(", ")
    )
}

fn assemble_named(
    store: &GraphStore,
    named: Vec<(String, Vec<String>)>,
    strategy: &str,
) -> SuperGraph {
    let mut cluster_of: HashMap<&str, &str> = HashMap::new();
    for (id, members) in &named {
        for member in members {
            cluster_of.insert(member.as_str(), id.as_str());
        }
    }

    // Super-edges: one unit per file-level edge crossing the partition
    let mut weights: BTreeMap<(String, String), u32> = BTreeMap::new();
    for edge in store.edges() {
        let Some(target) = edge.target.as_file() else {
            continue;
        };
        let (Some(&from), Some(&to)) = (
            cluster_of.get(edge.source.as_str()),
            cluster_of.get(target),
        ) else {
            continue;
        };
        if from == to {
            continue;
        }
        *weights
            .entry((from.to_string(), to.to_string()))
            .or_insert(0) += 1;
    }
    let edges: Vec<SuperEdge> = weights
        .into_iter()
        .map(|((from, to), weight)| SuperEdge { from, to, weight })
        .collect();

    let total_files: usize = named.iter().map(|(_, members)| members.len()).sum();
    let total_clusters = named.len();

    let mut clusters = BTreeMap::new();
    for (id, members) in named {
        let mut languages: BTreeSet<String> = BTreeSet::new();
        for member in &members {
            if let Some(node) = store.node(member) {
                languages.insert(node.language.name().to_string());
            }
        }
        let languages: Vec<String> = languages.into_iter().collect();

        let mut ranked: Vec<&String> = members.iter().collect();
        ranked.sort_by(|a, b| importance(b).cmp(&importance(a)).then_with(|| a.cmp(b)));
        let key_files: Vec<String> = ranked.into_iter().take(3).cloned().collect();

        let description = describe(&members, &languages);
        clusters.insert(
            id,
            ClusterInfo {
                size: members.len(),
                estimated_lines: 50 * members.len(),
                languages,
                key_files,
                description,
                files: members,
            },
        );
    }

    let compression_ratio = if total_clusters > 0 {
        total_files as f64 / total_clusters as f64
    } else {
        1.0
    };

    SuperGraph {
        clusters,
        edges,
        metadata: SuperGraphMeta {
            total_files,
            total_clusters,
            compression_ratio,
            timestamp: now_secs(),
            strategy: strategy.to_string(),
        },
    }
}
