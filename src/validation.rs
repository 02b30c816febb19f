//! Path validation and canonicalization.
//!
//! Every path stored in the graph is a repository-relative key: forward
//! slashes, no leading `./`. Absolute filesystem paths are validated against
//! the repository root before they are turned into keys, so watcher events
//! and scan entries cannot smuggle paths from outside the repository into
//! the store.

use std::path::{Path, PathBuf};

/// Error types for path validation.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    /// Path cannot be canonicalized (doesn't exist or permission denied)
    #[error("cannot canonicalize path: {0}")]
    CannotCanonicalize(String),

    /// Resolved path escapes the repository root
    #[error("path escapes repository root: {0} (root: {1})")]
    OutsideRoot(String, String),
}

/// Canonicalize a path using std::fs::canonicalize.
///
/// Resolves symlinks, `..`, and `.` components to an absolute path.
/// Fails if the path doesn't exist or cannot be accessed.
pub fn canonicalize_path(path: &Path) -> Result<PathBuf, PathValidationError> {
    std::fs::canonicalize(path)
        .map_err(|_| PathValidationError::CannotCanonicalize(path.to_string_lossy().to_string()))
}

/// Validate that a path is within the given root and return its canonical form.
///
/// Both sides are canonicalized, so symlinks that escape the root are caught
/// along with plain `../` traversal. This is the single gate between raw
/// filesystem paths (watcher events, scan entries) and store keys.
pub fn validate_path_within_root(path: &Path, root: &Path) -> Result<PathBuf, PathValidationError> {
    let canonical_path = canonicalize_path(path)?;
    let canonical_root = canonicalize_path(root)?;

    if !canonical_path.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot(
            canonical_path.to_string_lossy().to_string(),
            canonical_root.to_string_lossy().to_string(),
        ));
    }

    Ok(canonical_path)
}

/// Convert an absolute path inside `root` to a repository-relative store key.
///
/// The key uses forward slashes on every platform and never starts with `./`.
/// Returns an error if the path escapes the root.
pub fn repo_relative_key(path: &Path, root: &Path) -> Result<String, PathValidationError> {
    let canonical = validate_path_within_root(path, root)?;
    let canonical_root = canonicalize_path(root)?;
    let rel = canonical
        .strip_prefix(&canonical_root)
        .map_err(|_| {
            PathValidationError::OutsideRoot(
                canonical.to_string_lossy().to_string(),
                canonical_root.to_string_lossy().to_string(),
            )
        })?;
    Ok(normalize_key(&rel.to_string_lossy()))
}

/// Normalize an already-relative path string into key form.
///
/// Collapses `.` segments, strips a leading `./`, and converts backslashes.
/// Rejects nothing: callers that need containment checks must go through
/// [`validate_path_within_root`] first.
pub fn normalize_key(rel: &str) -> String {
    let unified = rel.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                // Keys are repository-relative; a surviving ".." means the
                // caller skipped validation. Keep it visible rather than
                // silently eating a segment.
                parts.push("..");
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Resolve a relative specifier (`./x`, `../y`) against the directory of a
/// source key, yielding a normalized candidate key.
///
/// Returns `None` when the specifier climbs above the repository root.
pub fn join_relative(source_key: &str, specifier: &str) -> Option<String> {
    let dir = match source_key.rfind('/') {
        Some(idx) => &source_key[..idx],
        None => "",
    };

    let mut parts: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };

    let normalized_specifier = specifier.replace('\\', "/");
    for seg in normalized_specifier.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                if parts.pop().is_none() {
                    return None;
                }
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
