//! Common AST and parsing abstractions shared by every language adapter.
//!
//! A [`LanguageAdapter`] is the thin layer between tree-sitter and the rest
//! of the engine: it turns source text into a [`ParseIndex`] of entities and
//! import statements that the Language Analyzers (C4), Code Connector (C7)
//! and Package Analyzer (C8) all consume.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Kinds of top-level entities the adapters extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A free function.
    Function,
    /// A method defined on a class/struct/impl block.
    Method,
    /// A class, struct, or equivalent type definition.
    Class,
    /// A module-level constant (conventionally upper-case, or `const`).
    Constant,
}

/// 1-based source location, matching tree-sitter's row/column convention
/// after conversion from 0-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Path of the file this location belongs to.
    pub file_path: String,
    /// First line of the entity (1-based, inclusive).
    pub start_line: usize,
    /// Last line of the entity (1-based, inclusive).
    pub end_line: usize,
}

impl SourceLocation {
    /// Build a location from tree-sitter's 0-based row values.
    pub fn from_rows(file_path: &str, start_row: usize, end_row: usize) -> Self {
        Self {
            file_path: file_path.to_string(),
            start_line: start_row + 1,
            end_line: end_row + 1,
        }
    }
}

/// A single extracted entity (function, class, constant, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEntity {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity name, as written in source.
    pub name: String,
    /// Doc comment immediately preceding the entity, if any.
    pub doc: Option<String>,
    /// Names this entity calls out to (used by the Code Connector's
    /// semantic-score and the Package Analyzer's orphan detection).
    pub calls: Vec<String>,
    /// True if this entity's body is empty or is a stub (`pass`, `TODO`,
    /// `NotImplementedError`, `unimplemented!()`, ...). Feeds the Code
    /// Connector's need-score.
    pub is_stub: bool,
    /// Source location.
    pub location: SourceLocation,
}

/// A single import/include/use statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStatement {
    /// The module path or package name as written (e.g. `os.path`,
    /// `./sibling`, `crate::foo`).
    pub module: String,
    /// Named items imported from `module`, if the syntax names any
    /// (`from os import path` -> `["path"]`); empty for whole-module
    /// imports.
    pub items: Vec<String>,
    /// 1-based line number of the import statement.
    pub line: usize,
}

/// The result of parsing one source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseIndex {
    /// Top-level entities found in the file.
    pub entities: Vec<ParsedEntity>,
    /// Import statements found in the file.
    pub imports: Vec<ImportStatement>,
    /// True if the file contains an entry-point guard (`if __name__ ==
    /// "__main__"`, `func main()`, `fn main()`, ...).
    pub has_entry_guard: bool,
    /// Set when tree-sitter produced one or more ERROR/MISSING nodes.
    /// The caller turns this into a `ParseFailed` Issue rather than
    /// aborting analysis of the file.
    pub parse_error: Option<String>,
}

impl ParseIndex {
    /// Functions and methods only, in source order.
    pub fn callables(&self) -> impl Iterator<Item = &ParsedEntity> {
        self.entities
            .iter()
            .filter(|e| matches!(e.kind, EntityKind::Function | EntityKind::Method))
    }
}

/// Per-language parsing and entity extraction.
///
/// Implementations hold their own `tree_sitter::Parser`; a parser is not
/// safely shared across concurrent parses, so the registry hands out a
/// fresh adapter instance per analyzer task rather than sharing one.
#[async_trait]
pub trait LanguageAdapter: Send {
    /// Canonical language key (`"python"`, `"javascript"`, ...). Used as
    /// the Memory Store's per-language namespace and as the Pattern
    /// Record `language` field.
    fn language_name(&self) -> &'static str;

    /// File extensions this adapter claims, without the leading dot.
    fn file_extensions(&self) -> &'static [&'static str];

    /// Parse `source` (from `file_path`, used only for location tagging)
    /// into a [`ParseIndex`]. Never returns `Err` for malformed source —
    /// a parse failure is recorded in [`ParseIndex::parse_error`] so the
    /// caller can emit a critical Issue and continue the run.
    fn parse(&mut self, file_path: &str, source: &str) -> Result<ParseIndex>;
}
