//! Python dependency extraction using tree-sitter-python.
//!
//! Imports are statement-level: only direct children of the module node are
//! examined, so an `import` inside a function body is not an edge. Calls and
//! inheritance come from a full tree walk since they live inside bodies.

use crate::common::node_text;
use crate::extract::{EdgeKind, RawEdge, ResolveHint, SymbolKind, SymbolRecord};

/// Extract edges and top-level symbols from a parsed Python module.
pub fn extract(root: &tree_sitter::Node, source: &[u8]) -> (Vec<RawEdge>, Vec<SymbolRecord>) {
    let mut edges = Vec::new();
    let mut symbols = Vec::new();

    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        match child.kind() {
            "import_statement" => extract_import(&child, source, &mut edges),
            "import_from_statement" => extract_from_import(&child, source, &mut edges),
            "function_definition" => push_symbol(&child, source, SymbolKind::Function, &mut symbols),
            "class_definition" => push_symbol(&child, source, SymbolKind::Class, &mut symbols),
            "decorated_definition" => {
                if let Some(def) = child.child_by_field_name("definition") {
                    match def.kind() {
                        "function_definition" => {
                            push_symbol(&def, source, SymbolKind::Function, &mut symbols)
                        }
                        "class_definition" => {
                            push_symbol(&def, source, SymbolKind::Class, &mut symbols)
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    walk_bodies(root, source, &mut edges);

    (edges, symbols)
}

/// `import a.b, c as d` produces one edge per imported module.
fn extract_import(node: &tree_sitter::Node, source: &[u8], edges: &mut Vec<RawEdge>) {
    let line = node.start_position().row + 1;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let module = match child.kind() {
            "dotted_name" => node_text(source, child.start_byte(), child.end_byte()),
            "aliased_import" => child
                .child_by_field_name("name")
                .and_then(|n| node_text(source, n.start_byte(), n.end_byte())),
            _ => None,
        };
        if let Some(module) = module {
            edges.push(RawEdge::new(
                module,
                EdgeKind::Import,
                line,
                ResolveHint::Module,
            ));
        }
    }
}

/// `from a.b import x` and `from . import y`: the edge targets the module,
/// not the imported names.
fn extract_from_import(node: &tree_sitter::Node, source: &[u8], edges: &mut Vec<RawEdge>) {
    let line = node.start_position().row + 1;
    if let Some(module_node) = node.child_by_field_name("module_name") {
        if let Some(module) = node_text(source, module_node.start_byte(), module_node.end_byte()) {
            edges.push(RawEdge::new(
                module,
                EdgeKind::Import,
                line,
                ResolveHint::Module,
            ));
        }
    }
}

fn push_symbol(
    node: &tree_sitter::Node,
    source: &[u8],
    kind: SymbolKind,
    symbols: &mut Vec<SymbolRecord>,
) {
    if let Some(name_node) = node.child_by_field_name("name") {
        if let Some(name) = node_text(source, name_node.start_byte(), name_node.end_byte()) {
            symbols.push(SymbolRecord {
                name,
                kind,
                line: node.start_position().row + 1,
            });
        }
    }
}

/// Full-tree walk for calls and class inheritance.
fn walk_bodies(node: &tree_sitter::Node, source: &[u8], edges: &mut Vec<RawEdge>) {
    match node.kind() {
        "call" => {
            if let Some(function) = node.child_by_field_name("function") {
                if matches!(function.kind(), "identifier" | "attribute") {
                    if let Some(callee) =
                        node_text(source, function.start_byte(), function.end_byte())
                    {
                        edges.push(RawEdge::new(
                            callee,
                            EdgeKind::Call,
                            node.start_position().row + 1,
                            ResolveHint::ExactOnly,
                        ));
                    }
                }
            }
        }
        "class_definition" => {
            if let Some(superclasses) = node.child_by_field_name("superclasses") {
                let line = node.start_position().row + 1;
                let mut cursor = superclasses.walk();
                for base in superclasses.named_children(&mut cursor) {
                    if matches!(base.kind(), "identifier" | "attribute") {
                        if let Some(name) = node_text(source, base.start_byte(), base.end_byte()) {
                            edges.push(RawEdge::new(
                                name,
                                EdgeKind::Inheritance,
                                line,
                                ResolveHint::ExactOnly,
                            ));
                        }
                    }
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_bodies(&child, source, edges);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_file, Language};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn edges_of(source: &[u8]) -> Vec<RawEdge> {
        let (record, warning) = extract_file("test.py", Language::Python, source, TIMEOUT);
        assert!(warning.is_none(), "unexpected warning: {:?}", warning);
        record.edges
    }

    #[test]
    fn plain_import() {
        let edges = edges_of(b"import os\n");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, "os");
        assert_eq!(edges[0].kind, EdgeKind::Import);
        assert_eq!(edges[0].line, 1);
        assert_eq!(edges[0].hint, ResolveHint::Module);
    }

    #[test]
    fn dotted_and_aliased_imports() {
        let edges = edges_of(b"import pkg.sub\nimport numpy as np\n");
        let targets: Vec<&str> = edges.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["pkg.sub", "numpy"]);
        assert_eq!(edges[1].line, 2);
    }

    #[test]
    fn multi_module_import_statement() {
        let edges = edges_of(b"import os, sys\n");
        let targets: Vec<&str> = edges.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["os", "sys"]);
    }

    #[test]
    fn from_import_targets_module() {
        let edges = edges_of(b"from pkg.mod import thing, other\n");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, "pkg.mod");
    }

    #[test]
    fn relative_from_import_keeps_dots() {
        let edges = edges_of(b"from . import sibling\nfrom ..shared import util\n");
        let targets: Vec<&str> = edges.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec![".", "..shared"]);
    }

    #[test]
    fn imports_inside_functions_are_not_edges() {
        let source = b"def f():\n    import json\n    return json\n";
        let edges = edges_of(source);
        assert!(edges.iter().all(|e| e.kind != EdgeKind::Import));
    }

    #[test]
    fn calls_are_extracted_from_bodies() {
        let source = b"import helpers\n\ndef run():\n    helpers.setup()\n    compute()\n";
        let edges = edges_of(source);
        let calls: Vec<&str> = edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Call)
            .map(|e| e.target.as_str())
            .collect();
        assert_eq!(calls, vec!["helpers.setup", "compute"]);
    }

    #[test]
    fn inheritance_edges_from_class_bases() {
        let source = b"class Handler(Base, mixins.Logged):\n    pass\n";
        let edges = edges_of(source);
        let bases: Vec<&str> = edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Inheritance)
            .map(|e| e.target.as_str())
            .collect();
        assert_eq!(bases, vec!["Base", "mixins.Logged"]);
    }

    #[test]
    fn top_level_symbols() {
        let source = b"def main():\n    pass\n\nclass App:\n    def method(self):\n        pass\n";
        let (record, _) = extract_file("test.py", Language::Python, source, TIMEOUT);
        let names: Vec<&str> = record.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["main", "App"]);
        assert_eq!(record.symbols[0].kind, SymbolKind::Function);
        assert_eq!(record.symbols[1].kind, SymbolKind::Class);
    }

    #[test]
    fn decorated_definitions_are_symbols() {
        let source = b"@decorator\ndef task():\n    pass\n";
        let (record, _) = extract_file("test.py", Language::Python, source, TIMEOUT);
        assert_eq!(record.symbols.len(), 1);
        assert_eq!(record.symbols[0].name, "task");
    }
}
