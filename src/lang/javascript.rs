//! JavaScript language adapter.

use tree_sitter::{Language, Node, Parser};

use crate::core::errors::{Result, VigilError};
use crate::lang::common::{
    EntityKind, ImportStatement, LanguageAdapter, ParseIndex, ParsedEntity, SourceLocation,
};

/// Tree-sitter backed adapter for JavaScript source.
pub struct JavaScriptAdapter {
    parser: Parser,
}

impl JavaScriptAdapter {
    /// Construct a new adapter.
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_javascript::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| VigilError::parse("javascript", format!("grammar load failed: {e}")))?;
        Ok(Self { parser })
    }

    fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
        node.utf8_text(source.as_bytes()).unwrap_or_default()
    }

    fn is_stub_body(body_text: &str) -> bool {
        let trimmed = body_text.trim().trim_matches(|c| c == '{' || c == '}').trim();
        trimmed.is_empty() || trimmed.contains("TODO") || trimmed.contains("not implemented")
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

    fn function_like(node: Node, source: &str, file_path: &str, kind: EntityKind) -> Option<ParsedEntity> {
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(n, source).to_string())?;
        let location =
            SourceLocation::from_rows(file_path, node.start_position().row, node.end_position().row);
        let mut calls = Vec::new();
        Self::extract_calls(node, source, &mut calls);
        Some(ParsedEntity {
            kind,
            name,
            doc: None,
            calls,
            is_stub: Self::is_stub_body(Self::node_text(node, source)),
            location,
        })
    }

    fn const_declaration(node: Node, source: &str, file_path: &str, out: &mut Vec<ParsedEntity>) {
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            if let Some(name_node) = declarator.child_by_field_name("name") {
                let name = Self::node_text(name_node, source);
                if name.chars().all(|c| c.is_uppercase() || c == '_' || c.is_numeric()) {
                    out.push(ParsedEntity {
                        kind: EntityKind::Constant,
                        name: name.to_string(),
                        doc: None,
                        calls: Vec::new(),
                        is_stub: false,
                        location: SourceLocation::from_rows(
                            file_path,
                            node.start_position().row,
                            node.end_position().row,
                        ),
                    });
                }
            }
        }
    }

    fn walk_module(node: Node, source: &str, file_path: &str, index: &mut ParseIndex) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_declaration" => {
                    if let Some(e) = Self::function_like(child, source, file_path, EntityKind::Function) {
                        index.entities.push(e);
                    }
                }
                "class_declaration" => {
                    if let Some(e) = Self::function_like(child, source, file_path, EntityKind::Class) {
                        index.entities.push(e);
                    }
                }
                "lexical_declaration" | "variable_declaration" => {
                    Self::const_declaration(child, source, file_path, &mut index.entities);
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
impl LanguageAdapter for JavaScriptAdapter {
    fn language_name(&self) -> &'static str {
        "javascript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn parse(&mut self, file_path: &str, source: &str) -> Result<ParseIndex> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| VigilError::parse("javascript", "tree-sitter returned no tree"))?;
        let root = tree.root_node();
        let mut index = ParseIndex::default();
        if Self::has_error(root) {
            index.parse_error = Some("syntax error in JavaScript source".to_string());
        }
        Self::walk_module(root, source, file_path, &mut index);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_function_and_import() {
        let mut adapter = JavaScriptAdapter::new().unwrap();
        let source = "import fs from 'fs';\n\nfunction greet() {\n  console.log('hi');\n}\n";
        let index = adapter.parse("greet.js", source).unwrap();
        assert_eq!(index.imports.len(), 1);
        assert_eq!(index.entities.len(), 1);
        assert_eq!(index.entities[0].name, "greet");
    }
}
