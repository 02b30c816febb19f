//! Language detection from file extensions.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages with a working extractor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    C,
    Cpp,
}

/// File extensions eligible for watching and scanning.
pub const WATCHED_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "c", "cpp", "cc", "cxx", "h", "hpp",
];

impl Language {
    /// Lowercase display name used in query output and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// Artifact group for snapshot files. Mirrors the analyzer split:
    /// one artifact per analyzer, not per dialect.
    pub fn artifact_group(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript | Language::TypeScript => "javascript",
            Language::C | Language::Cpp => "cpp",
        }
    }

    /// All artifact groups in stable order.
    pub fn artifact_groups() -> &'static [&'static str] {
        &["python", "javascript", "cpp"]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "python" => Some(Language::Python),
            "javascript" => Some(Language::JavaScript),
            "typescript" => Some(Language::TypeScript),
            "c" => Some(Language::C),
            "cpp" => Some(Language::Cpp),
            _ => None,
        }
    }
}

/// Detect the language of a path from its extension.
///
/// Returns None for anything outside the watched set; callers skip those
/// files with an `UnsupportedLanguage` diagnostic.
pub fn detect_language(path: &Path) -> Option<Language> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "py" => Some(Language::Python),
        "js" | "jsx" => Some(Language::JavaScript),
        "ts" | "tsx" => Some(Language::TypeScript),
        "c" | "h" => Some(Language::C),
        "cpp" | "cc" | "cxx" | "hpp" => Some(Language::Cpp),
        _ => None,
    }
}

/// Whether the path's extension is in the watched set.
pub fn is_watched_extension(path: &Path) -> bool {
    detect_language(path).is_some()
}
