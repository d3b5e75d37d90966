//! Rust language adapter.

use tree_sitter::{Language, Node, Parser};

use crate::core::errors::{Result, VigilError};
use crate::lang::common::{
    EntityKind, ImportStatement, LanguageAdapter, ParseIndex, ParsedEntity, SourceLocation,
};

/// Tree-sitter backed adapter for Rust source.
pub struct RustAdapter {
    parser: Parser,
}

impl RustAdapter {
    /// Construct a new adapter.
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_rust::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| VigilError::parse("rust", format!("grammar load failed: {e}")))?;
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
            if child.kind() == "macro_invocation" {
                if let Some(name) = child.child_by_field_name("macro") {
                    out.push(Self::node_text(name, source).to_string());
                }
            }
            Self::extract_calls(child, source, out);
        }
    }

    fn is_stub_body(node: Node, source: &str) -> bool {
        let text = Self::node_text(node, source);
        text.contains("unimplemented!") || text.contains("todo!()")
    }

    fn item_entity(node: Node, source: &str, file_path: &str, nested: bool) -> Option<ParsedEntity> {
        let kind = match node.kind() {
            "function_item" => {
                if nested {
                    EntityKind::Method
                } else {
                    EntityKind::Function
                }
            }
            "struct_item" | "enum_item" | "trait_item" => EntityKind::Class,
            "const_item" | "static_item" => EntityKind::Constant,
            _ => return None,
        };
        let name_node = node.child_by_field_name("name")?;
        let name = Self::node_text(name_node, source).to_string();
        let location =
            SourceLocation::from_rows(file_path, node.start_position().row, node.end_position().row);
        let mut calls = Vec::new();
        Self::extract_calls(node, source, &mut calls);
        Some(ParsedEntity {
            kind,
            name,
            doc: None,
            calls,
            is_stub: Self::is_stub_body(node, source),
            location,
        })
    }

    fn walk_items(node: Node, source: &str, file_path: &str, index: &mut ParseIndex, in_impl: bool) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_item" | "struct_item" | "enum_item" | "trait_item" | "const_item"
                | "static_item" => {
                    if let Some(e) = Self::item_entity(child, source, file_path, in_impl) {
                        index.entities.push(e);
                    }
                    if child.kind() == "function_item" {
                        if Self::node_text(child, source).contains("fn main") {
                            index.has_entry_guard = true;
                        }
                    }
                }
                "impl_item" => {
                    if let Some(body) = child.child_by_field_name("body") {
                        Self::walk_items(body, source, file_path, index, true);
                    }
                }
                "mod_item" => {
                    if let Some(body) = child.child_by_field_name("body") {
                        Self::walk_items(body, source, file_path, index, in_impl);
                    }
                }
                "use_declaration" => {
                    let line = child.start_position().row + 1;
                    index.imports.push(ImportStatement {
                        module: Self::node_text(child, source)
                            .trim_start_matches("use ")
                            .trim_end_matches(';')
                            .to_string(),
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
impl LanguageAdapter for RustAdapter {
    fn language_name(&self) -> &'static str {
        "rust"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn parse(&mut self, file_path: &str, source: &str) -> Result<ParseIndex> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| VigilError::parse("rust", "tree-sitter returned no tree"))?;
        let root = tree.root_node();
        let mut index = ParseIndex::default();
        if Self::has_error(root) {
            index.parse_error = Some("syntax error in Rust source".to_string());
        }
        Self::walk_items(root, source, file_path, &mut index, false);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_function_and_use() {
        let mut adapter = RustAdapter::new().unwrap();
        let source = "use std::fs;\n\nfn greet() {\n    println!(\"hi\");\n}\n";
        let index = adapter.parse("greet.rs", source).unwrap();
        assert_eq!(index.imports.len(), 1);
        assert_eq!(index.entities.len(), 1);
        assert_eq!(index.entities[0].name, "greet");
    }

    #[test]
    fn methods_inside_impl_are_tagged_method() {
        let mut adapter = RustAdapter::new().unwrap();
        let source = "struct Foo;\nimpl Foo {\n    fn bar(&self) {}\n}\n";
        let index = adapter.parse("foo.rs", source).unwrap();
        let method = index
            .entities
            .iter()
            .find(|e| e.name == "bar")
            .expect("method present");
        assert!(matches!(method.kind, EntityKind::Method));
    }
}
