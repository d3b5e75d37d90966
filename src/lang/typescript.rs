//! TypeScript language adapter.
//!
//! TypeScript's grammar is a superset of the JavaScript one for the
//! entity shapes this engine cares about (functions, classes, imports),
//! plus `interface_declaration`. Reuses the same extraction logic as
//! [`crate::lang::javascript`] with the TypeScript grammar loaded.

use tree_sitter::{Language, Node, Parser};

use crate::core::errors::{Result, VigilError};
use crate::lang::common::{
    EntityKind, ImportStatement, LanguageAdapter, ParseIndex, ParsedEntity, SourceLocation,
};

/// Tree-sitter backed adapter for TypeScript source.
pub struct TypeScriptAdapter {
    parser: Parser,
}

impl TypeScriptAdapter {
    /// Construct a new adapter.
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| VigilError::parse("typescript", format!("grammar load failed: {e}")))?;
        Ok(Self { parser })
    }

    fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
        node.utf8_text(source.as_bytes()).unwrap_or_default()
    }

    fn extract_calls(node: Node, source: &str, out: &mut Vec<String>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "call_expression" {
                if let Some(func) = child.child_by_field_name("function") {
                    out.push(Self::node_text(func, source).to_string());
                }
            }
            Self::extract_calls(child, source, out);
        }
    }

    fn named_entity(node: Node, source: &str, file_path: &str, kind: EntityKind) -> Option<ParsedEntity> {
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(n, source).to_string())?;
        let location =
            SourceLocation::from_rows(file_path, node.start_position().row, node.end_position().row);
        let mut calls = Vec::new();
        Self::extract_calls(node, source, &mut calls);
        let body_text = Self::node_text(node, source);
        let is_stub = body_text.trim_matches(|c| c == '{' || c == '}').trim().is_empty()
            || body_text.contains("TODO")
            || body_text.contains("not implemented");
        Some(ParsedEntity {
            kind,
            name,
            doc: None,
            calls,
            is_stub,
            location,
        })
    }

    fn walk_module(node: Node, source: &str, file_path: &str, index: &mut ParseIndex) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_declaration" => {
                    if let Some(e) = Self::named_entity(child, source, file_path, EntityKind::Function) {
                        index.entities.push(e);
                    }
                }
                "class_declaration" | "interface_declaration" => {
                    if let Some(e) = Self::named_entity(child, source, file_path, EntityKind::Class) {
                        index.entities.push(e);
                    }
                }
                "import_statement" => {
                    let line = child.start_position().row + 1;
                    let module = child
                        .children(&mut child.walk())
                        .find(|n| n.kind() == "string")
                        .map(|n| Self::node_text(n, source).trim_matches(|c| c == '"' || c == '\'').to_string())
                        .unwrap_or_default();
                    index.imports.push(ImportStatement {
                        module,
                        items: Vec::new(),
                        line,
                    });
                }
                _ => {}
            }
        }
    }

    fn has_error(node: Node) -> bool {
        if node.is_error() || node.is_missing() {
            return true;
        }
        let mut cursor = node.walk();
        node.children(&mut cursor).any(Self::has_error)
    }
}

#[async_trait::async_trait]
impl LanguageAdapter for TypeScriptAdapter {
    fn language_name(&self) -> &'static str {
        "typescript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx"]
    }

    fn parse(&mut self, file_path: &str, source: &str) -> Result<ParseIndex> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| VigilError::parse("typescript", "tree-sitter returned no tree"))?;
        let root = tree.root_node();
        let mut index = ParseIndex::default();
        if Self::has_error(root) {
            index.parse_error = Some("syntax error in TypeScript source".to_string());
        }
        Self::walk_module(root, source, file_path, &mut index);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_interface_and_function() {
        let mut adapter = TypeScriptAdapter::new().unwrap();
        let source = "interface Greeter {\n  name: string;\n}\n\nfunction greet(): void {\n  console.log('hi');\n}\n";
        let index = adapter.parse("greet.ts", source).unwrap();
        assert_eq!(index.entities.len(), 2);
    }
}
