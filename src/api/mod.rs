//! Query/control API: a thin dispatcher over the query engine, the
//! clusterer's output, and daemon control.
//!
//! Transport is newline-delimited JSON: each request line carries a `verb`
//! plus parameters, each response line is `{"ok": ...}` or
//! `{"error": {"kind": ..., "message": ...}}`. The API is stateless; the
//! same dispatcher backs the one-shot CLI commands and the `serve` loop.

use crate::diagnostics::ErrorKind;
use crate::extract::EdgeKind;
use crate::graph::cluster::SuperGraph;
use crate::graph::query;
use crate::graph::snapshot::{GraphDir, MetricsFile};
use crate::graph::store::GraphStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{BufRead, Write};

fn default_depth() -> usize {
    3
}

fn default_limit() -> usize {
    10
}

/// One API request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Request {
    /// Bounded BFS from a file
    FindRelated {
        file: String,
        #[serde(default = "default_depth")]
        max_depth: usize,
        /// Edge kind names; absent means all kinds
        #[serde(default)]
        types: Option<Vec<String>>,
        #[serde(default)]
        include_reverse: bool,
    },
    /// Keyword search over paths and symbols
    SearchSymbols { keywords: Vec<String> },
    /// Ranked simple paths between well-connected files
    HotPaths {
        #[serde(default = "default_limit")]
        limit: usize,
    },
    /// Import/call cycles
    DetectCycles {},
    /// Composite architecture report
    Overview {},
    /// The cluster-level graph
    Supergraph {},
    /// Daemon liveness plus metrics
    Status {},
    /// Ask the daemon to stop
    Stop {},
    /// Ask the daemon to re-scan everything
    Refresh {},
}

/// API response envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok(serde_json::Value),
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn ok<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Response::Ok(v),
            Err(e) => Response::Error {
                kind: ErrorKind::QueryBadInput,
                message: format!("response serialization failed: {}", e),
            },
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Response::Error {
            kind: ErrorKind::QueryBadInput,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }
}

/// Everything a dispatcher invocation may read.
pub struct ApiContext<'a> {
    pub store: &'a GraphStore,
    pub supergraph: Option<&'a SuperGraph>,
    pub metrics: Option<&'a MetricsFile>,
    pub graph_dir: &'a GraphDir,
}

/// Dispatch one request against a consistent store view.
pub fn dispatch(ctx: &ApiContext, request: &Request) -> Response {
    match request {
        Request::FindRelated {
            file,
            max_depth,
            types,
            include_reverse,
        } => {
            let kinds = match parse_kinds(types.as_deref()) {
                Ok(kinds) => kinds,
                Err(message) => return Response::bad_input(message),
            };
            // Unknown files are an empty success, not an error
            let related = query::find_related(
                ctx.store,
                file,
                *max_depth,
                kinds.as_deref(),
                *include_reverse,
            );
            Response::ok(related)
        }
        Request::SearchSymbols { keywords } => {
            if keywords.is_empty() {
                return Response::bad_input("keywords must not be empty");
            }
            Response::ok(query::search_symbols(ctx.store, keywords))
        }
        Request::HotPaths { limit } => Response::ok(query::hot_paths(ctx.store, *limit)),
        Request::DetectCycles {} => Response::ok(query::detect_cycles(ctx.store)),
        Request::Overview {} => Response::ok(query::architecture_overview(ctx.store)),
        Request::Supergraph {} => match ctx.supergraph {
            Some(supergraph) => Response::ok(supergraph),
            None => Response::ok(SuperGraph::empty()),
        },
        Request::Status {} => Response::ok(status_view(ctx)),
        Request::Stop {} => signal_verb(ctx, sysinfo::Signal::Term, "stop"),
        Request::Refresh {} => signal_verb(ctx, sysinfo::Signal::User1, "refresh"),
    }
}

fn parse_kinds(types: Option<&[String]>) -> Result<Option<Vec<EdgeKind>>, String> {
    let Some(types) = types else {
        return Ok(None);
    };
    let mut kinds = Vec::with_capacity(types.len());
    for name in types {
        match EdgeKind::from_name(name) {
            Some(kind) => kinds.push(kind),
            None => return Err(format!("unknown edge type '{}'", name)),
        }
    }
    Ok(Some(kinds))
}

fn status_view(ctx: &ApiContext) -> serde_json::Value {
    let pid = crate::daemon::lock::read_pid(&ctx.graph_dir.lock_path());
    let running = pid.map(crate::daemon::lock::process_alive).unwrap_or(false);
    json!({
        "running": running,
        "pid": pid,
        "total_files": ctx.store.node_count(),
        "total_edges": ctx.store.edge_count(),
        "languages": ctx.store.language_counts(),
        "metrics": ctx.metrics.map(|m| &m.daemon),
        "clusters": ctx.supergraph.map(|s| s.metadata.total_clusters),
    })
}

fn signal_verb(ctx: &ApiContext, signal: sysinfo::Signal, verb: &str) -> Response {
    match crate::daemon::lock::signal_daemon(ctx.graph_dir, signal) {
        Ok(true) => Response::ok(json!({ "signalled": verb })),
        Ok(false) => Response::bad_input("no running daemon"),
        Err(e) => Response::Error {
            kind: ErrorKind::QueryBadInput,
            message: e.to_string(),
        },
    }
}

/// Serve newline-delimited JSON requests until EOF.
pub fn serve<R: BufRead, W: Write>(ctx: &ApiContext, reader: R, mut writer: W) -> Result<()> {
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(ctx, &request),
            Err(e) => Response::bad_input(format!("malformed request: {}", e)),
        };
        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(())
}
