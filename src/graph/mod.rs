//! The structural graph: store, resolution, queries, clustering, snapshots.

pub mod cluster;
pub mod filter;
pub mod query;
pub mod resolve;
pub mod snapshot;
pub mod store;

pub use cluster::{build_supergraph, needs_recluster, SuperEdge, SuperGraph, MISC_CLUSTER};
pub use filter::FileFilter;
pub use query::{
    architecture_overview, detect_cycles, find_related, hot_paths, search_symbols, Overview,
    RelatedFile, SymbolHit,
};
pub use snapshot::{GraphDir, LanguageArtifact, MetricsFile};
pub use store::{ChangeSet, Edge, FileNode, GraphStore, Target};
