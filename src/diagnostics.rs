//! Structured diagnostics and tagged error kinds.
//!
//! Per-file problems never abort a batch: they become [`Diagnostic`] records
//! that are logged, counted in metrics, and surfaced through the API. The
//! [`ErrorKind`] enum is the tagged error vocabulary shared by the daemon,
//! the snapshot writer, and the API layer.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Tagged error kinds with a fixed policy each.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A single extraction failed or timed out. Batch continues.
    ExtractFailed,
    /// Graph store internal invariant violated. Fatal.
    StoreUnavailable,
    /// Disk write or rename failed. Retried with backoff, then degraded.
    SnapshotFailed,
    /// Another daemon instance holds the lock. Refuse to start.
    LockHeld,
    /// Filesystem watch subsystem disconnected.
    WatcherLost,
    /// Malformed API request.
    QueryBadInput,
}

impl ErrorKind {
    /// Stable string tag used in API responses and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::ExtractFailed => "extract_failed",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::SnapshotFailed => "snapshot_failed",
            ErrorKind::LockHeld => "lock_held",
            ErrorKind::WatcherLost => "watcher_lost",
            ErrorKind::QueryBadInput => "query_bad_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Reason why a file was skipped during scanning/watching.
///
/// Each variant is a deterministic decision point in the filtering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// File is not a regular file (directory, special file)
    NotAFile,
    /// Extension is not in the watched set
    UnsupportedLanguage,
    /// Internal hard-coded ignore rules (.graph/, .git/, node_modules/, ...)
    IgnoredInternal,
    /// Matched by gitignore-style rules (.gitignore, .ignore)
    IgnoredByGitignore,
    /// Excluded by a user-configured pattern
    ExcludedByPattern,
    /// Content hash unchanged since the last extraction
    Unchanged,
}

impl SkipReason {
    /// Stable sort key for deterministic ordering.
    pub fn sort_key(&self) -> u8 {
        match self {
            SkipReason::IgnoredInternal => 0,
            SkipReason::IgnoredByGitignore => 1,
            SkipReason::ExcludedByPattern => 2,
            SkipReason::UnsupportedLanguage => 3,
            SkipReason::NotAFile => 4,
            SkipReason::Unchanged => 5,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SkipReason::NotAFile => "not a regular file",
            SkipReason::UnsupportedLanguage => "extension not watched",
            SkipReason::IgnoredInternal => "internal ignore rule",
            SkipReason::IgnoredByGitignore => "matched by gitignore",
            SkipReason::ExcludedByPattern => "excluded by pattern",
            SkipReason::Unchanged => "content unchanged",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A diagnostic event from the scan/watch/extract pipeline.
///
/// Either a skipped file or a per-file failure. Designed for deterministic
/// sorting so logs and test assertions are stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    /// File was skipped before extraction
    Skipped {
        /// Path relative to root
        path: String,
        reason: SkipReason,
    },
    /// A per-file failure (extraction, read, ...)
    Failed {
        /// Path relative to root
        path: String,
        kind: ErrorKind,
        message: String,
    },
}

impl Diagnostic {
    pub fn skipped(path: impl Into<String>, reason: SkipReason) -> Self {
        Diagnostic::Skipped {
            path: path.into(),
            reason,
        }
    }

    pub fn extract_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic::Failed {
            path: path.into(),
            kind: ErrorKind::ExtractFailed,
            message: message.into(),
        }
    }

    /// The file path this diagnostic refers to.
    pub fn path(&self) -> &str {
        match self {
            Diagnostic::Skipped { path, .. } => path,
            Diagnostic::Failed { path, .. } => path,
        }
    }

    /// Whether this diagnostic counts against the error metric.
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Failed { .. })
    }

    /// Stable sort key: path first, errors before skips, then reason order.
    fn sort_key(&self) -> (&str, u8, u8) {
        match self {
            Diagnostic::Failed { path, .. } => (path, 0, 0),
            Diagnostic::Skipped { path, reason } => (path, 1, reason.sort_key()),
        }
    }
}

impl PartialOrd for Diagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Diagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Skipped { path, reason } => write!(f, "SKIP {} ({})", path, reason),
            Diagnostic::Failed {
                path,
                kind,
                message,
            } => write!(f, "ERROR {} [{}] {}", path, kind, message),
        }
    }
}
