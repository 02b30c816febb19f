//! One-shot query commands: load the snapshot, dispatch, print JSON.

use codegraph::api::{dispatch, ApiContext, Request, Response};
use codegraph::{GraphDir, GraphStore, SuperGraph};
use std::path::Path;

/// Load snapshot state and run one request against it.
fn run_request(root: &Path, request: Request) -> u8 {
    let graph_dir = GraphDir::for_repo(root);

    let store = match graph_dir.load_store() {
        Ok(Some(store)) => store,
        Ok(None) => GraphStore::new(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    let supergraph: Option<SuperGraph> = graph_dir.load_supergraph().ok().flatten();
    let metrics = graph_dir.load_metrics().ok().flatten();

    let ctx = ApiContext {
        store: &store,
        supergraph: supergraph.as_ref(),
        metrics: metrics.as_ref(),
        graph_dir: &graph_dir,
    };
    let response = dispatch(&ctx, &request);
    print_response(&response)
}

fn print_response(response: &Response) -> u8 {
    match serde_json::to_string_pretty(response) {
        Ok(json) => {
            println!("{}", json);
            if response.is_ok() {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

pub fn related(
    root: &Path,
    file: &str,
    depth: usize,
    types: Option<Vec<String>>,
    reverse: bool,
) -> u8 {
    run_request(
        root,
        Request::FindRelated {
            file: file.to_string(),
            max_depth: depth,
            types,
            include_reverse: reverse,
        },
    )
}

pub fn symbols(root: &Path, keywords: Vec<String>) -> u8 {
    run_request(root, Request::SearchSymbols { keywords })
}

pub fn cycles(root: &Path) -> u8 {
    run_request(root, Request::DetectCycles {})
}

pub fn hot_paths(root: &Path, limit: usize) -> u8 {
    run_request(root, Request::HotPaths { limit })
}

pub fn overview(root: &Path) -> u8 {
    run_request(root, Request::Overview {})
}

pub fn clusters(root: &Path) -> u8 {
    run_request(root, Request::Supergraph {})
}

pub fn status(root: &Path) -> u8 {
    run_request(root, Request::Status {})
}
