//! JavaScript / TypeScript dependency extraction.
//!
//! Covers ES-module imports (static and dynamic), CommonJS `require`,
//! re-exports with a source, class inheritance, and call expressions. The
//! TSX grammar parses .ts and .tsx; .js and .jsx use the JavaScript grammar.

use crate::common::{node_text, strip_quotes};
use crate::extract::{EdgeKind, RawEdge, ResolveHint, SymbolKind, SymbolRecord};

/// Extract edges and top-level symbols from a parsed JS/TS program.
pub fn extract(root: &tree_sitter::Node, source: &[u8]) -> (Vec<RawEdge>, Vec<SymbolRecord>) {
    let mut edges = Vec::new();
    let mut symbols = Vec::new();

    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        match child.kind() {
            "import_statement" => extract_import(&child, source, &mut edges),
            "export_statement" => {
                // `export { x } from './y'` carries a source like an import
                if let Some(source_node) = child.child_by_field_name("source") {
                    push_specifier_edge(&child, &source_node, source, EdgeKind::Import, &mut edges);
                }
                if let Some(decl) = child.child_by_field_name("declaration") {
                    push_declaration_symbol(&decl, source, &mut symbols);
                }
            }
            _ => push_declaration_symbol(&child, source, &mut symbols),
        }
    }

    walk_bodies(root, source, &mut edges);

    (edges, symbols)
}

fn extract_import(node: &tree_sitter::Node, source: &[u8], edges: &mut Vec<RawEdge>) {
    if let Some(source_node) = node.child_by_field_name("source") {
        push_specifier_edge(node, &source_node, source, EdgeKind::Import, edges);
    }
}

/// Push an edge for a quoted module specifier node.
fn push_specifier_edge(
    statement: &tree_sitter::Node,
    source_node: &tree_sitter::Node,
    source: &[u8],
    kind: EdgeKind,
    edges: &mut Vec<RawEdge>,
) {
    if let Some(raw) = node_text(source, source_node.start_byte(), source_node.end_byte()) {
        let specifier = strip_quotes(&raw).to_string();
        if specifier.is_empty() {
            return;
        }
        let hint = specifier_hint(&specifier);
        edges.push(RawEdge::new(
            specifier,
            kind,
            statement.start_position().row + 1,
            hint,
        ));
    }
}

/// Relative specifiers resolve against the source directory; bare package
/// specifiers stay external.
fn specifier_hint(specifier: &str) -> ResolveHint {
    if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." {
        ResolveHint::Relative
    } else {
        ResolveHint::Never
    }
}

fn push_declaration_symbol(
    node: &tree_sitter::Node,
    source: &[u8],
    symbols: &mut Vec<SymbolRecord>,
) {
    let kind = match node.kind() {
        "function_declaration" | "generator_function_declaration" => SymbolKind::Function,
        "class_declaration" => SymbolKind::Class,
        _ => return,
    };
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

/// Full-tree walk: require(), dynamic import(), plain calls, inheritance.
fn walk_bodies(node: &tree_sitter::Node, source: &[u8], edges: &mut Vec<RawEdge>) {
    match node.kind() {
        "call_expression" => extract_call(node, source, edges),
        "class_declaration" | "class" => {
            // JS wraps `extends <expr>` in class_heritage directly; the TS
            // grammar nests an extends_clause inside it
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "class_heritage" {
                    let line = node.start_position().row + 1;
                    let mut inner = child.walk();
                    for base in child.named_children(&mut inner) {
                        match base.kind() {
                            "identifier" | "member_expression" => {
                                push_base(&base, source, line, edges);
                            }
                            "extends_clause" => {
                                let mut clause = base.walk();
                                for value in base.named_children(&mut clause) {
                                    if matches!(
                                        value.kind(),
                                        "identifier" | "member_expression"
                                    ) {
                                        push_base(&value, source, line, edges);
                                    }
                                }
                            }
                            _ => {}
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

fn push_base(node: &tree_sitter::Node, source: &[u8], line: usize, edges: &mut Vec<RawEdge>) {
    if let Some(name) = node_text(source, node.start_byte(), node.end_byte()) {
        edges.push(RawEdge::new(
            name,
            EdgeKind::Inheritance,
            line,
            ResolveHint::ExactOnly,
        ));
    }
}

fn extract_call(node: &tree_sitter::Node, source: &[u8], edges: &mut Vec<RawEdge>) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let line = node.start_position().row + 1;

    // Dynamic `import('x')` parses as a call whose function node is `import`
    if function.kind() == "import" {
        if let Some(arg) = first_string_argument(node, source) {
            let hint = specifier_hint(&arg);
            edges.push(RawEdge::new(arg, EdgeKind::Import, line, hint));
        }
        return;
    }

    let callee = match node_text(source, function.start_byte(), function.end_byte()) {
        Some(text) => text,
        None => return,
    };

    if function.kind() == "identifier" && callee == "require" {
        if let Some(arg) = first_string_argument(node, source) {
            let hint = specifier_hint(&arg);
            edges.push(RawEdge::new(arg, EdgeKind::Require, line, hint));
        }
        return;
    }

    if matches!(function.kind(), "identifier" | "member_expression") {
        edges.push(RawEdge::new(
            callee,
            EdgeKind::Call,
            line,
            ResolveHint::ExactOnly,
        ));
    }
}

/// The first string argument of a call, unquoted. None when the argument is
/// dynamic (template with substitutions, variable) since those cannot be
/// resolved deterministically.
fn first_string_argument(call: &tree_sitter::Node, source: &[u8]) -> Option<String> {
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    for arg in args.named_children(&mut cursor) {
        if arg.kind() == "string" {
            let raw = node_text(source, arg.start_byte(), arg.end_byte())?;
            let spec = strip_quotes(&raw).to_string();
            if !spec.is_empty() {
                return Some(spec);
            }
        }
        break;
    }
    None
}
