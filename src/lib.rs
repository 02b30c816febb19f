//! codegraph: a live, queryable structural model of a source repository.
//!
//! A daemon watches the repository, extracts imports, includes, requires,
//! calls, and inheritance per file, and maintains an in-memory dependency
//! graph with incremental updates. Derived artifacts (per-language node and
//! edge listings, metrics, a community-detection super-graph) are written
//! atomically into the `.graph/` directory so external readers always see
//! a coherent snapshot.
//!
//! # Position Conventions
//!
//! Edge and symbol records carry 1-indexed line numbers (line 1 is the
//! first line), matching editor conventions.
//!
//! # Pipeline
//!
//! watcher → coalesced batch → parallel extraction → sequential apply →
//! resolution sweep → clusterer (when membership drifts) → snapshot.

pub mod api;
pub mod common;
pub mod config;
pub mod daemon;
pub mod diagnostics;
pub mod extract;
pub mod graph;
pub mod metrics;
pub mod pipeline;
pub mod validation;
pub mod watcher;

pub use api::{dispatch, ApiContext, Request, Response};
pub use config::Config;
pub use daemon::{DaemonError, LockError, LockFile};
pub use diagnostics::{Diagnostic, ErrorKind, SkipReason};
pub use extract::{
    detect_language, extract_file, EdgeKind, ExtractionRecord, Language, RawEdge, ResolveHint,
    SymbolKind, SymbolRecord,
};
pub use graph::{
    architecture_overview, build_supergraph, detect_cycles, find_related, hot_paths,
    search_symbols, ChangeSet, Edge, FileFilter, FileNode, GraphDir, GraphStore, Overview,
    RelatedFile, SuperGraph, SymbolHit, Target,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipeline::{BatchOutcome, Pipeline};
pub use watcher::{EventKind, FileEvent, FileSystemWatcher, WatcherBatch, WatcherConfig};
