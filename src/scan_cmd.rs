//! One-shot scan command: index the repository, write a snapshot, exit.

use codegraph::{build_supergraph, Config, FileFilter, GraphDir, GraphStore, Metrics, Pipeline};
use std::path::Path;
use std::sync::RwLock;
use std::time::Instant;

pub fn run(root: &Path, config: Config) -> u8 {
    match scan(root, config) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.to_string().contains("snapshot") {
                3
            } else {
                1
            }
        }
    }
}

fn scan(root: &Path, config: Config) -> anyhow::Result<()> {
    let graph_dir = GraphDir::for_repo(root);
    graph_dir.ensure_exists()?;

    let pipeline = Pipeline::new(root, config)?;
    let filter = FileFilter::new(pipeline.root(), &pipeline.config().ignore_patterns)?;

    // Start from the previous snapshot so unchanged files are skipped
    let store = RwLock::new(graph_dir.load_store()?.unwrap_or_default());
    let metrics = match graph_dir.load_metrics()? {
        Some(file) => Metrics::restore(&file.daemon),
        None => Metrics::new(),
    };

    let started = Instant::now();
    let outcome = pipeline.full_scan(&store, &filter)?;
    metrics.record_update(started.elapsed());
    for _ in 0..outcome.error_count() {
        metrics.record_error();
    }

    let store = store.into_inner().expect("store lock poisoned");
    let supergraph = build_supergraph(&store, pipeline.config());
    graph_dir.write_snapshot(&store, &metrics.snapshot(), &supergraph)?;

    println!(
        "Scanned {}: {} indexed, {} removed, {} skipped, {} errors, {} clusters",
        root.display(),
        outcome.applied,
        outcome.removed,
        outcome.skipped,
        outcome.error_count(),
        supergraph.metadata.total_clusters
    );
    Ok(())
}
