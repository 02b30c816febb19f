//! Per-language dependency extraction.
//!
//! An extractor is a pure function from (path, bytes) to an
//! [`ExtractionRecord`]: no filesystem access, no cross-file resolution, no
//! global state. Resolution of raw targets into file nodes happens later in
//! the graph store, which is the only component that knows the node set.
//!
//! Malformed input never fails an extraction catastrophically: a parse
//! failure or timeout produces an empty record plus an `ExtractFailed`
//! diagnostic, and the batch continues.

pub mod c;
pub mod detect;
pub mod javascript;
pub mod pool;
pub mod python;

pub use detect::{detect_language, is_watched_extension, Language, WATCHED_EXTENSIONS};

use crate::diagnostics::Diagnostic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Relationship kind of a dependency edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Import,
    Include,
    Require,
    Call,
    Inheritance,
}

impl EdgeKind {
    pub fn name(&self) -> &'static str {
        match self {
            EdgeKind::Import => "import",
            EdgeKind::Include => "include",
            EdgeKind::Require => "require",
            EdgeKind::Call => "call",
            EdgeKind::Inheritance => "inheritance",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "import" => Some(EdgeKind::Import),
            "include" => Some(EdgeKind::Include),
            "require" => Some(EdgeKind::Require),
            "call" => Some(EdgeKind::Call),
            "inheritance" => Some(EdgeKind::Inheritance),
            _ => None,
        }
    }
}

/// How the store may attempt to resolve a raw target to a repo file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResolveHint {
    /// Dotted module name, resolved via language module-to-path rules
    Module,
    /// Relative specifier, resolved against the source file's directory
    Relative,
    /// Opaque identifier; only an exact repo-relative path match counts
    ExactOnly,
    /// Never resolved (system headers, package specifiers)
    Never,
}

/// One raw dependency observation, before target resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawEdge {
    /// Target as written in the source (module name, specifier, callee)
    pub target: String,
    pub kind: EdgeKind,
    /// 1-indexed line of the originating statement
    pub line: usize,
    pub hint: ResolveHint,
}

impl RawEdge {
    pub fn new(target: impl Into<String>, kind: EdgeKind, line: usize, hint: ResolveHint) -> Self {
        Self {
            target: target.into(),
            kind,
            line,
            hint,
        }
    }
}

/// Kind of a top-level symbol captured for search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
}

/// A top-level definition name, used by symbol search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolRecord {
    pub name: String,
    pub kind: SymbolKind,
    /// 1-indexed line of the definition
    pub line: usize,
}

/// The complete output of one file extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionRecord {
    /// Repository-relative key of the extracted file
    pub file: String,
    pub language: Language,
    /// SHA-256 of the file contents, hex-encoded
    pub content_hash: String,
    pub edges: Vec<RawEdge>,
    pub symbols: Vec<SymbolRecord>,
}

impl ExtractionRecord {
    /// An empty record for a file that parsed to nothing (or failed).
    pub fn empty(file: impl Into<String>, language: Language, content_hash: String) -> Self {
        Self {
            file: file.into(),
            language,
            content_hash,
            edges: Vec::new(),
            symbols: Vec::new(),
        }
    }
}

/// Hex SHA-256 of file contents.
pub fn content_hash(source: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Extract a dependency record from one file's contents.
///
/// # Guarantees
/// - Pure: same (file, language, source) always produces the same record
/// - Total: parse failures and timeouts yield an empty record plus a
///   diagnostic, never an error that would abort a batch
pub fn extract_file(
    file: &str,
    language: Language,
    source: &[u8],
    timeout: Duration,
) -> (ExtractionRecord, Option<Diagnostic>) {
    let hash = content_hash(source);

    let grammar = pool::Grammar::for_file(language, file);
    let parsed = pool::with_parser(grammar, timeout, |parser| {
        parser.parse(source, None).map(|tree| {
            let root = tree.root_node();
            match language {
                Language::Python => python::extract(&root, source),
                Language::JavaScript | Language::TypeScript => javascript::extract(&root, source),
                Language::C | Language::Cpp => c::extract(&root, source, language),
            }
        })
    });

    match parsed {
        Ok(Some((edges, symbols))) => (
            ExtractionRecord {
                file: file.to_string(),
                language,
                content_hash: hash,
                edges,
                symbols,
            },
            None,
        ),
        Ok(None) => (
            ExtractionRecord::empty(file, language, hash),
            Some(Diagnostic::extract_failed(
                file,
                "parse failed or timed out",
            )),
        ),
        Err(e) => (
            ExtractionRecord::empty(file, language, hash),
            Some(Diagnostic::extract_failed(
                file,
                format!("parser init failed: {}", e),
            )),
        ),
    }
}
