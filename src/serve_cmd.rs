//! Serve command: answer newline-delimited JSON requests on stdin.

use codegraph::api::{serve, ApiContext};
use codegraph::{GraphDir, GraphStore};
use std::io::{BufReader, Write};
use std::path::Path;

pub fn run(root: &Path) -> u8 {
    let graph_dir = GraphDir::for_repo(root);

    let store = match graph_dir.load_store() {
        Ok(Some(store)) => store,
        Ok(None) => GraphStore::new(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    let supergraph = graph_dir.load_supergraph().ok().flatten();
    let metrics = graph_dir.load_metrics().ok().flatten();

    let ctx = ApiContext {
        store: &store,
        supergraph: supergraph.as_ref(),
        metrics: metrics.as_ref(),
        graph_dir: &graph_dir,
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let result = serve(&ctx, BufReader::new(stdin.lock()), stdout.lock());
    let _ = std::io::stdout().flush();

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
