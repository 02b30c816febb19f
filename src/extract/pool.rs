//! Thread-local parser pool for reusing tree-sitter Parser instances.
//!
//! Each worker thread keeps one lazily-initialized parser per grammar, so
//! parallel extraction never contends on a shared parser and never pays
//! re-initialization cost per file.

use crate::extract::detect::Language;
use anyhow::Result;
use std::cell::RefCell;
use std::time::Duration;

/// Grammar selection. TypeScript splits by dialect: the TSX grammar is not
/// a superset of plain TypeScript (angle-bracket type assertions), so .ts
/// and .tsx get separate parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    C,
    Cpp,
}

impl Grammar {
    /// Pick the grammar for a file given its detected language.
    pub fn for_file(language: Language, file: &str) -> Self {
        match language {
            Language::Python => Grammar::Python,
            Language::JavaScript => Grammar::JavaScript,
            Language::TypeScript => {
                if file.ends_with(".tsx") {
                    Grammar::Tsx
                } else {
                    Grammar::TypeScript
                }
            }
            Language::C => Grammar::C,
            Language::Cpp => Grammar::Cpp,
        }
    }
}

thread_local! {
    static PYTHON_PARSER: RefCell<Option<tree_sitter::Parser>> = const { RefCell::new(None) };
    static JAVASCRIPT_PARSER: RefCell<Option<tree_sitter::Parser>> = const { RefCell::new(None) };
    static TYPESCRIPT_PARSER: RefCell<Option<tree_sitter::Parser>> = const { RefCell::new(None) };
    static TSX_PARSER: RefCell<Option<tree_sitter::Parser>> = const { RefCell::new(None) };
    static C_PARSER: RefCell<Option<tree_sitter::Parser>> = const { RefCell::new(None) };
    static CPP_PARSER: RefCell<Option<tree_sitter::Parser>> = const { RefCell::new(None) };
}

fn with_cell<F, R>(
    cell: &'static std::thread::LocalKey<RefCell<Option<tree_sitter::Parser>>>,
    grammar: tree_sitter::Language,
    f: F,
) -> Result<R>
where
    F: FnOnce(&mut tree_sitter::Parser) -> R,
{
    cell.with(|parser_cell| {
        let mut parser_ref = parser_cell.borrow_mut();
        if parser_ref.is_none() {
            let mut parser = tree_sitter::Parser::new();
            parser.set_language(&grammar)?;
            *parser_ref = Some(parser);
        }
        let parser = parser_ref
            .as_mut()
            .expect("parser initialized directly above");
        Ok(f(parser))
    })
}

/// Execute a closure with the calling thread's parser for `grammar`.
///
/// The parse timeout applies to the single closure invocation; a timed-out
/// parse makes `Parser::parse` return None, which extractors report as an
/// empty record.
pub fn with_parser<F, R>(grammar: Grammar, timeout: Duration, f: F) -> Result<R>
where
    F: FnOnce(&mut tree_sitter::Parser) -> R,
{
    let run = |parser: &mut tree_sitter::Parser| {
        parser.set_timeout_micros(timeout.as_micros() as u64);
        f(parser)
    };
    match grammar {
        Grammar::Python => with_cell(&PYTHON_PARSER, tree_sitter_python::language(), run),
        Grammar::JavaScript => {
            with_cell(&JAVASCRIPT_PARSER, tree_sitter_javascript::language(), run)
        }
        Grammar::TypeScript => with_cell(
            &TYPESCRIPT_PARSER,
            tree_sitter_typescript::language_typescript(),
            run,
        ),
        Grammar::Tsx => with_cell(&TSX_PARSER, tree_sitter_typescript::language_tsx(), run),
        Grammar::C => with_cell(&C_PARSER, tree_sitter_c::language(), run),
        Grammar::Cpp => with_cell(&CPP_PARSER, tree_sitter_cpp::language(), run),
    }
}

/// Warm up all parsers on the calling thread to avoid first-parse latency.
pub fn warmup_parsers() -> Result<()> {
    let cases: [(Grammar, &[u8]); 6] = [
        (Grammar::Python, b"import os"),
        (Grammar::JavaScript, b"import './a.js';"),
        (Grammar::TypeScript, b"import x from './a';"),
        (Grammar::Tsx, b"export const x = <div/>;"),
        (Grammar::C, b"#include <stdio.h>"),
        (Grammar::Cpp, b"#include <vector>"),
    ];
    for (grammar, source) in cases {
        with_parser(grammar, Duration::from_secs(5), |parser| {
            parser.parse(source, None);
        })?;
    }
    Ok(())
}
