//! File filtering for scanning and watching.
//!
//! Precedence order:
//! 1. Hard internal ignores (the graph directory, VCS dirs, dependency and
//!    build outputs, virtual environments)
//! 2. Gitignore-style rules (.gitignore, .ignore)
//! 3. User-configured exclude patterns
//! 4. Watched-extension gate
//!
//! Filtering is a pure function of the path: same inputs, same answer.

use crate::diagnostics::SkipReason;
use crate::extract::is_watched_extension;
use anyhow::Result;
use ignore::gitignore::Gitignore;
use std::path::{Path, PathBuf};

/// Directory names that are always ignored.
const INTERNAL_IGNORE_DIRS: &[&str] = &[
    ".graph",
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "dist",
    "build",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
];

/// Filter state compiled once per scan/watch session.
pub struct FileFilter {
    root: PathBuf,
    gitignore: Option<Gitignore>,
    exclude_patterns: Vec<globset::GlobMatcher>,
}

impl FileFilter {
    /// Compile a filter for the given root.
    ///
    /// `exclude_patterns` are user-configured globs matched against the
    /// repository-relative path.
    pub fn new(root: &Path, exclude_patterns: &[String]) -> Result<Self> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let gitignore = Self::load_gitignore(&root)?;

        let mut matchers = Vec::new();
        for pattern in exclude_patterns {
            let glob = globset::Glob::new(pattern)
                .map_err(|e| anyhow::anyhow!("invalid ignore pattern '{}': {}", pattern, e))?;
            matchers.push(glob.compile_matcher());
        }

        Ok(Self {
            root,
            gitignore,
            exclude_patterns: matchers,
        })
    }

    fn load_gitignore(root: &Path) -> Result<Option<Gitignore>> {
        let mut builder = ignore::gitignore::GitignoreBuilder::new(root);

        let gitignore_path = root.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(err) = builder.add(&gitignore_path) {
                // Malformed gitignore must not kill indexing
                eprintln!("Warning: failed to load .gitignore: {}", err);
            }
        }
        let ignore_path = root.join(".ignore");
        if ignore_path.exists() {
            if let Some(err) = builder.add(&ignore_path) {
                eprintln!("Warning: failed to load .ignore: {}", err);
            }
        }

        Ok(Some(builder.build()?))
    }

    /// Full check for an existing file.
    pub fn should_skip(&self, path: &Path) -> Option<SkipReason> {
        if !path.is_file() {
            return Some(SkipReason::NotAFile);
        }
        self.should_skip_lexical(path)
    }

    /// Check that never touches the filesystem. Used for deletion events,
    /// where the path no longer exists.
    pub fn should_skip_lexical(&self, path: &Path) -> Option<SkipReason> {
        if self.is_internal_ignore(path) {
            return Some(SkipReason::IgnoredInternal);
        }

        let rel = path.strip_prefix(&self.root).unwrap_or(path);

        if let Some(ref gitignore) = self.gitignore {
            if gitignore.matched(rel, false).is_ignore() {
                return Some(SkipReason::IgnoredByGitignore);
            }
        }

        for matcher in &self.exclude_patterns {
            if matcher.is_match(rel) {
                return Some(SkipReason::ExcludedByPattern);
            }
        }

        if !is_watched_extension(path) {
            return Some(SkipReason::UnsupportedLanguage);
        }

        None
    }

    fn is_internal_ignore(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .map(|name| INTERNAL_IGNORE_DIRS.contains(&name))
                .unwrap_or(false)
        })
    }
}
