//! C and C++ dependency extraction.
//!
//! Includes are preprocessor-level: the walk covers the translation unit and
//! conditional preprocessor blocks but never descends into function bodies.
//! Local `#include "x.h"` targets resolve against the repository; system
//! `#include <x>` targets stay external. C++ adds base-class inheritance.

use crate::common::node_text;
use crate::extract::{EdgeKind, Language, RawEdge, ResolveHint, SymbolKind, SymbolRecord};

/// Extract edges and top-level symbols from a parsed C/C++ translation unit.
pub fn extract(
    root: &tree_sitter::Node,
    source: &[u8],
    language: Language,
) -> (Vec<RawEdge>, Vec<SymbolRecord>) {
    let mut edges = Vec::new();
    let mut symbols = Vec::new();

    walk_preproc(root, source, &mut edges);
    collect_symbols(root, source, &mut symbols);
    walk_bodies(root, source, language, &mut edges);

    (edges, symbols)
}

/// Walk preprocessor structure for includes without entering function bodies.
fn walk_preproc(node: &tree_sitter::Node, source: &[u8], edges: &mut Vec<RawEdge>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "preproc_include" => {
                if let Some(edge) = include_edge(&child, source) {
                    edges.push(edge);
                }
            }
            "preproc_if" | "preproc_ifdef" | "preproc_else" | "preproc_elif"
            | "linkage_specification" | "namespace_definition" | "declaration_list" => {
                walk_preproc(&child, source, edges);
            }
            _ => {}
        }
    }
}

fn include_edge(node: &tree_sitter::Node, source: &[u8]) -> Option<RawEdge> {
    let path_node = node.child_by_field_name("path")?;
    let raw = node_text(source, path_node.start_byte(), path_node.end_byte())?;
    let line = node.start_position().row + 1;

    match path_node.kind() {
        "string_literal" => {
            let target = raw.trim_matches('"').to_string();
            if target.is_empty() {
                return None;
            }
            Some(RawEdge::new(
                target,
                EdgeKind::Include,
                line,
                ResolveHint::Relative,
            ))
        }
        "system_lib_string" => {
            let target = raw.trim_start_matches('<').trim_end_matches('>').to_string();
            if target.is_empty() {
                return None;
            }
            Some(RawEdge::new(
                target,
                EdgeKind::Include,
                line,
                ResolveHint::Never,
            ))
        }
        _ => None,
    }
}

/// Top-level functions plus struct/class definitions.
fn collect_symbols(root: &tree_sitter::Node, source: &[u8], symbols: &mut Vec<SymbolRecord>) {
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                if let Some(name) = function_name(&child, source) {
                    symbols.push(SymbolRecord {
                        name,
                        kind: SymbolKind::Function,
                        line: child.start_position().row + 1,
                    });
                }
            }
            "struct_specifier" | "class_specifier" => {
                push_type_symbol(&child, source, symbols);
            }
            // `typedef struct {...} t;` and declaration-wrapped specifiers
            "declaration" | "type_definition" => {
                let mut inner = child.walk();
                for part in child.named_children(&mut inner) {
                    if matches!(part.kind(), "struct_specifier" | "class_specifier") {
                        push_type_symbol(&part, source, symbols);
                    }
                }
            }
            "namespace_definition" | "linkage_specification" => {
                if let Some(body) = child.child_by_field_name("body") {
                    collect_symbols(&body, source, symbols);
                }
            }
            _ => {}
        }
    }
}

/// A named struct/class with a body is a type definition worth indexing.
fn push_type_symbol(node: &tree_sitter::Node, source: &[u8], symbols: &mut Vec<SymbolRecord>) {
    if node.child_by_field_name("body").is_none() {
        return;
    }
    if let Some(name_node) = node.child_by_field_name("name") {
        if let Some(name) = node_text(source, name_node.start_byte(), name_node.end_byte()) {
            symbols.push(SymbolRecord {
                name,
                kind: SymbolKind::Class,
                line: node.start_position().row + 1,
            });
        }
    }
}

/// Descend declarator wrappers (pointers, parens) to the defining identifier.
fn function_name(definition: &tree_sitter::Node, source: &[u8]) -> Option<String> {
    let mut current = definition.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" | "qualified_identifier" => {
                return node_text(source, current.start_byte(), current.end_byte());
            }
            _ => match current.child_by_field_name("declarator") {
                Some(inner) => current = inner,
                None => return None,
            },
        }
    }
}

/// Full-tree walk for calls and C++ base classes.
fn walk_bodies(
    node: &tree_sitter::Node,
    source: &[u8],
    language: Language,
    edges: &mut Vec<RawEdge>,
) {
    match node.kind() {
        "call_expression" => {
            if let Some(function) = node.child_by_field_name("function") {
                if matches!(
                    function.kind(),
                    "identifier" | "field_expression" | "qualified_identifier"
                ) {
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
        "base_class_clause" if language == Language::Cpp => {
            let line = node.start_position().row + 1;
            let mut cursor = node.walk();
            for base in node.named_children(&mut cursor) {
                if matches!(
                    base.kind(),
                    "type_identifier" | "qualified_identifier" | "template_type"
                ) {
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
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_bodies(&child, source, language, edges);
    }
}
