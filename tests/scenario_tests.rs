//! End-to-end scenarios over the library pipeline: concrete repositories in,
//! observable query results out.

use codegraph::{
    build_supergraph, detect_cycles, find_related, Config, FileFilter, GraphStore, Pipeline,
};
use std::path::Path;
use std::sync::RwLock;
use tempfile::TempDir;

fn write_repo(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (path, contents) in files {
        let full = tmp.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, contents).unwrap();
    }
    tmp
}

fn scan_repo(root: &Path, config: Config) -> GraphStore {
    let pipeline = Pipeline::new(root, config).unwrap();
    let filter = FileFilter::new(pipeline.root(), &[]).unwrap();
    let store = RwLock::new(GraphStore::new());
    pipeline.full_scan(&store, &filter).unwrap();
    store.into_inner().unwrap()
}

/// S1: two JS files, one import, forward and reverse queries.
#[test]
fn two_file_import_forward_and_reverse() {
    let repo = write_repo(&[("a.js", "import './b.js';\n"), ("b.js", "")]);
    let store = scan_repo(repo.path(), Config::default());

    assert_eq!(store.node_count(), 2);
    let edges: Vec<_> = store.out_edges("a.js", None).collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target.as_file(), Some("b.js"));

    let forward = find_related(&store, "a.js", 1, None, false);
    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].path, "b.js");
    assert_eq!(forward[0].relationship, "import");
    assert_eq!(forward[0].depth, 1);
    assert!((forward[0].confidence - 1.0).abs() < 1e-9);

    let reverse = find_related(&store, "b.js", 1, None, true);
    assert_eq!(reverse.len(), 1);
    assert_eq!(reverse[0].path, "a.js");
    assert_eq!(reverse[0].relationship, "reverse_import");
    assert_eq!(reverse[0].depth, 1);
}

/// S2: three Python files in a cycle.
#[test]
fn python_import_cycle() {
    let repo = write_repo(&[
        ("x.py", "import y\n"),
        ("y.py", "import z\n"),
        ("z.py", "import x\n"),
    ]);
    let store = scan_repo(repo.path(), Config::default());

    let cycles = detect_cycles(&store);
    assert_eq!(cycles.len(), 1);
    let members: std::collections::BTreeSet<&str> =
        cycles[0].iter().map(|s| s.as_str()).collect();
    assert_eq!(
        members,
        std::collections::BTreeSet::from(["x.py", "y.py", "z.py"])
    );

    let related = find_related(&store, "x.py", 3, None, false);
    let y = related.iter().find(|r| r.path == "y.py").unwrap();
    let z = related.iter().find(|r| r.path == "z.py").unwrap();
    assert_eq!(y.depth, 1);
    assert_eq!(z.depth, 2);
}

/// S3: five disconnected files stay below the clustering threshold.
#[test]
fn disconnected_small_repo_clusters_per_file() {
    let repo = write_repo(&[
        ("a.py", ""),
        ("b.py", ""),
        ("c.py", ""),
        ("d.py", ""),
        ("e.py", ""),
    ]);
    let store = scan_repo(repo.path(), Config::default());
    let supergraph = build_supergraph(&store, &Config::default());

    assert_eq!(supergraph.clusters.len(), 5);
    assert!(supergraph.edges.is_empty());
    assert_eq!(supergraph.metadata.compression_ratio, 1.0);
    assert_eq!(supergraph.metadata.strategy, "single_file");
}

/// S4 (scaled down): three tight directory trees, few cross edges. The
/// heaviest super-edges connect the majority clusters and the language
/// distribution is reported correctly.
#[test]
fn grouped_repo_produces_bounded_supergraph() {
    let mut files: Vec<(String, String)> = Vec::new();
    for group in ["alpha", "beta", "gamma"] {
        for i in 0..30 {
            let path = format!("{}/m{}.py", group, i);
            // Star topology: every member imports its group hub
            let mut contents = if i == 0 {
                String::new()
            } else {
                format!("from {}.m0 import thing\n", group)
            };
            // A few cross-group edges between leaf modules
            if i == 5 {
                match group {
                    "alpha" => contents.push_str("from beta.m9 import thing\n"),
                    "beta" => contents.push_str("from gamma.m9 import thing\n"),
                    _ => {}
                }
            }
            files.push((path, contents));
        }
    }

    let refs: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    let repo = write_repo(&refs);
    let store = scan_repo(repo.path(), Config::default());
    let supergraph = build_supergraph(&store, &Config::default());

    assert!(supergraph.clusters.len() <= 50);
    assert!(supergraph.metadata.total_files >= 90);
    assert!(!supergraph.edges.is_empty());

    let overview = codegraph::architecture_overview(&store);
    assert_eq!(
        overview.modules_by_language.get("python"),
        Some(&store.node_count())
    );
}

/// S5: two modifications within the quiescence window end up as one upsert
/// of the final content.
#[test]
fn rapid_edits_reflect_final_content() {
    let repo = write_repo(&[("b.py", ""), ("c.py", ""), ("a.py", "import b\n")]);
    let config = Config::default();
    let pipeline = Pipeline::new(repo.path(), config).unwrap();
    let filter = FileFilter::new(pipeline.root(), &[]).unwrap();
    let store = RwLock::new(GraphStore::new());
    pipeline.full_scan(&store, &filter).unwrap();

    // Two quick saves; the watcher would coalesce them into one event for
    // the same path, so the pipeline sees only the final on-disk content
    std::fs::write(repo.path().join("a.py"), "import os\n").unwrap();
    std::fs::write(repo.path().join("a.py"), "import c\n").unwrap();

    let batch = codegraph::WatcherBatch::from_events(vec![codegraph::FileEvent {
        kind: codegraph::EventKind::Upserted,
        path: repo.path().join("a.py"),
    }]);
    pipeline.process_batch(&store, &batch);

    let store = store.into_inner().unwrap();
    let targets: Vec<&str> = store
        .out_edges("a.py", None)
        .map(|e| e.raw.as_str())
        .collect();
    assert_eq!(targets, vec!["c"]);
}

/// Boundary: empty repository.
#[test]
fn empty_repository_is_well_formed() {
    let repo = write_repo(&[]);
    let store = scan_repo(repo.path(), Config::default());
    assert!(store.is_empty());

    let overview = codegraph::architecture_overview(&store);
    assert_eq!(overview.metrics.total_files, 0);
    assert!(overview.cycles.is_empty());
    assert!(overview.hot_paths.is_empty());

    let supergraph = build_supergraph(&store, &Config::default());
    assert_eq!(supergraph.metadata.total_clusters, 0);
}

/// Boundary: single file with no imports.
#[test]
fn single_file_repository() {
    let repo = write_repo(&[("only.py", "x = 1\n")]);
    let store = scan_repo(repo.path(), Config::default());
    assert_eq!(store.node_count(), 1);
    assert_eq!(store.edge_count(), 0);

    let supergraph = build_supergraph(&store, &Config::default());
    assert_eq!(supergraph.clusters.len(), 1);
    assert_eq!(supergraph.clusters["c0"].files, vec!["only.py".to_string()]);
}

/// Boundary: one below vs exactly at the small-project threshold.
#[test]
fn threshold_boundary_switches_strategy() {
    let config = Config {
        small_project_threshold: 4,
        min_cluster_size: 1,
        ..Config::default()
    };

    let repo = write_repo(&[("a.py", "import b\n"), ("b.py", ""), ("c.py", "import b\n")]);
    let store = scan_repo(repo.path(), config.clone());
    let supergraph = build_supergraph(&store, &config);
    assert_eq!(supergraph.metadata.strategy, "single_file");

    let repo = write_repo(&[
        ("a.py", "import b\n"),
        ("b.py", ""),
        ("c.py", "import b\n"),
        ("d.py", "import a\n"),
    ]);
    let store = scan_repo(repo.path(), config.clone());
    let supergraph = build_supergraph(&store, &config);
    assert_ne!(supergraph.metadata.strategy, "single_file");
}

/// Property 3: delete then re-create with identical content restores
/// query results.
#[test]
fn delete_recreate_restores_related() {
    let repo = write_repo(&[("b.py", ""), ("a.py", "import b\n")]);
    let pipeline = Pipeline::new(repo.path(), Config::default()).unwrap();
    let filter = FileFilter::new(pipeline.root(), &[]).unwrap();
    let store = RwLock::new(GraphStore::new());
    pipeline.full_scan(&store, &filter).unwrap();

    let before = find_related(&store.read().unwrap(), "a.py", 2, None, false);
    assert_eq!(before.len(), 1);

    std::fs::remove_file(repo.path().join("b.py")).unwrap();
    pipeline.full_scan(&store, &filter).unwrap();
    let during = find_related(&store.read().unwrap(), "a.py", 2, None, false);
    assert!(during.is_empty(), "stale target must not traverse");

    std::fs::write(repo.path().join("b.py"), "").unwrap();
    pipeline.full_scan(&store, &filter).unwrap();
    let after = find_related(&store.read().unwrap(), "a.py", 2, None, false);
    assert_eq!(before, after);
}

/// Property 1: replaying the same inputs leaves the store unchanged.
#[test]
fn replay_is_idempotent() {
    let repo = write_repo(&[
        ("pkg/__init__.py", ""),
        ("pkg/a.py", "from pkg.b import thing\n"),
        ("pkg/b.py", "import os\n"),
    ]);
    let pipeline = Pipeline::new(repo.path(), Config::default()).unwrap();
    let filter = FileFilter::new(pipeline.root(), &[]).unwrap();
    let store = RwLock::new(GraphStore::new());

    pipeline.full_scan(&store, &filter).unwrap();
    let first: Vec<codegraph::Edge> = store.read().unwrap().edges().cloned().collect();

    pipeline.full_scan(&store, &filter).unwrap();
    pipeline.full_scan(&store, &filter).unwrap();
    let last: Vec<codegraph::Edge> = store.read().unwrap().edges().cloned().collect();

    assert_eq!(first, last);
}

/// Property 2: cluster membership partitions the node set.
#[test]
fn clustering_partitions_nodes() {
    let mut files: Vec<(String, String)> = Vec::new();
    for i in 0..40 {
        let dir = ["web", "core", "util"][i % 3];
        let contents = if i >= 3 {
            format!("from {}.f{} import thing\n", dir, i - 3)
        } else {
            String::new()
        };
        files.push((format!("{}/f{}.py", dir, i), contents));
    }
    let refs: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    let repo = write_repo(&refs);
    let store = scan_repo(repo.path(), Config::default());
    let supergraph = build_supergraph(&store, &Config::default());

    let mut seen = std::collections::BTreeSet::new();
    for info in supergraph.clusters.values() {
        for file in &info.files {
            assert!(seen.insert(file.clone()), "{} appears twice", file);
        }
    }
    let all: std::collections::BTreeSet<String> =
        store.nodes().map(|n| n.path.clone()).collect();
    assert_eq!(seen, all);
}
