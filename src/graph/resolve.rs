//! Target resolution: raw specifiers to repository-relative file keys.
//!
//! Resolution is deliberately narrow: (i) exact repository-relative path
//! match and (ii) language-specific module-to-path conversion. Substring
//! matching produced false positives in earlier designs and is excluded.
//! Resolution only consults the current node set; it never touches the
//! filesystem, which keeps it pure and makes batch-order effects explicit.

use crate::extract::{Language, ResolveHint};
use crate::graph::store::FileNode;
use crate::validation::join_relative;
use std::collections::BTreeMap;

/// JS/TS extension inference order for extensionless relative specifiers.
const JS_EXTENSIONS: &[&str] = &["js", "ts", "tsx", "jsx"];

/// Attempt to resolve one raw target against the node set.
///
/// Returns the matching node's path, or None when the target stays external.
pub fn resolve_target(
    nodes: &BTreeMap<String, FileNode>,
    source: &str,
    raw: &str,
    hint: ResolveHint,
    language: Language,
) -> Option<String> {
    match hint {
        ResolveHint::Never => None,
        ResolveHint::ExactOnly => exact(nodes, raw),
        ResolveHint::Relative => match language {
            Language::C | Language::Cpp => resolve_include(nodes, source, raw),
            _ => resolve_js_relative(nodes, source, raw),
        },
        ResolveHint::Module => resolve_python_module(nodes, source, raw),
    }
}

fn exact(nodes: &BTreeMap<String, FileNode>, key: &str) -> Option<String> {
    nodes.contains_key(key).then(|| key.to_string())
}

/// JS/TS relative specifier: join against the source directory, then infer
/// extensions and `/index.*` in a fixed order.
fn resolve_js_relative(
    nodes: &BTreeMap<String, FileNode>,
    source: &str,
    specifier: &str,
) -> Option<String> {
    let base = join_relative(source, specifier)?;

    if let Some(found) = exact(nodes, &base) {
        return Some(found);
    }
    for ext in JS_EXTENSIONS {
        if let Some(found) = exact(nodes, &format!("{}.{}", base, ext)) {
            return Some(found);
        }
    }
    for ext in JS_EXTENSIONS {
        if let Some(found) = exact(nodes, &format!("{}/index.{}", base, ext)) {
            return Some(found);
        }
    }
    None
}

/// Local C/C++ include: relative to the including file's directory first,
/// then as a repository-root-relative path (the `-I <root>` convention).
fn resolve_include(
    nodes: &BTreeMap<String, FileNode>,
    source: &str,
    include: &str,
) -> Option<String> {
    if let Some(joined) = join_relative(source, include) {
        if let Some(found) = exact(nodes, &joined) {
            return Some(found);
        }
    }
    exact(nodes, include)
}

/// Python dotted module name. Absolute names resolve from the repository
/// root (`a.b.c` → `a/b/c.py` or `a/b/c/__init__.py`); leading dots walk up
/// from the importing file's package.
fn resolve_python_module(
    nodes: &BTreeMap<String, FileNode>,
    source: &str,
    module: &str,
) -> Option<String> {
    let dots = module.chars().take_while(|&c| c == '.').count();
    let rest = &module[dots..];

    let base = if dots == 0 {
        String::new()
    } else {
        // One dot = the importing file's package, each extra dot one level up
        let mut dir = match source.rfind('/') {
            Some(idx) => source[..idx].to_string(),
            None => String::new(),
        };
        for _ in 1..dots {
            match dir.rfind('/') {
                Some(idx) => dir.truncate(idx),
                None => {
                    if dir.is_empty() {
                        return None;
                    }
                    dir.clear();
                }
            }
        }
        dir
    };

    let module_path = rest.replace('.', "/");
    let prefix = match (base.is_empty(), module_path.is_empty()) {
        (_, true) => base,
        (true, false) => module_path,
        (false, false) => format!("{}/{}", base, module_path),
    };

    if prefix.is_empty() {
        return None;
    }

    if let Some(found) = exact(nodes, &format!("{}.py", prefix)) {
        return Some(found);
    }
    exact(nodes, &format!("{}/__init__.py", prefix))
}
