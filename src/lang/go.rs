//! Go language adapter.

use tree_sitter::{Language, Node, Parser};

use crate::core::errors::{Result, VigilError};
use crate::lang::common::{
    EntityKind, ImportStatement, LanguageAdapter, ParseIndex, ParsedEntity, SourceLocation,
};

/// Tree-sitter backed adapter for Go source.
pub struct GoAdapter {
    parser: Parser,
}

impl GoAdapter {
    /// Construct a new adapter.
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_go::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| VigilError::parse("go", format!("grammar load failed: {e}")))?;
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

    fn func_entity(node: Node, source: &str, file_path: &str) -> Option<ParsedEntity> {
        let kind = match node.kind() {
            "function_declaration" => EntityKind::Function,
            "method_declaration" => EntityKind::Method,
            _ => return None,
        };
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(n, source).to_string())?;
        let location =
            SourceLocation::from_rows(file_path, node.start_position().row, node.end_position().row);
        let mut calls = Vec::new();
        Self::extract_calls(node, source, &mut calls);
        let body_empty = node
            .child_by_field_name("body")
            .map(|b| b.named_child_count() == 0)
            .unwrap_or(false);
        Some(ParsedEntity {
            kind,
            name,
            doc: None,
            calls,
            is_stub: body_empty,
            location,
        })
    }

    fn walk_source(node: Node, source: &str, file_path: &str, index: &mut ParseIndex) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_declaration" | "method_declaration" => {
                    let name = child.child_by_field_name("name").map(|n| Self::node_text(n, source));
                    if name == Some("main") {
                        index.has_entry_guard = true;
                    }
                    if let Some(e) = Self::func_entity(child, source, file_path) {
                        index.entities.push(e);
                    }
                }
                "const_declaration" => {
                    let mut spec_cursor = child.walk();
                    for spec in child.named_children(&mut spec_cursor) {
                        if let Some(name_node) = spec.named_child(0) {
                            index.entities.push(ParsedEntity {
                                kind: EntityKind::Constant,
                                name: Self::node_text(name_node, source).to_string(),
                                doc: None,
                                calls: Vec::new(),
                                is_stub: false,
                                location: SourceLocation::from_rows(
                                    file_path,
                                    child.start_position().row,
                                    child.end_position().row,
                                ),
                            });
                        }
                    }
                }
                "import_declaration" => {
                    let line = child.start_position().row + 1;
                    let mut import_cursor = child.walk();
                    for spec in child
                        .children(&mut import_cursor)
                        .filter(|n| n.kind() == "import_spec_list" || n.kind() == "import_spec")
                    {
                        let mut inner_cursor = spec.walk();
                        let targets: Vec<Node> = if spec.kind() == "import_spec_list" {
                            spec.named_children(&mut inner_cursor).collect()
                        } else {
                            vec![spec]
                        };
                        for target in targets {
                            let path_node = target.child_by_field_name("path").unwrap_or(target);
                            index.imports.push(ImportStatement {
                                module: Self::node_text(path_node, source)
                                    .trim_matches('"')
                                    .to_string(),
                                items: Vec::new(),
                                line,
                            });
                        }
                    }
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
impl LanguageAdapter for GoAdapter {
    fn language_name(&self) -> &'static str {
        "go"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn parse(&mut self, file_path: &str, source: &str) -> Result<ParseIndex> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| VigilError::parse("go", "tree-sitter returned no tree"))?;
        let root = tree.root_node();
        let mut index = ParseIndex::default();
        if Self::has_error(root) {
            index.parse_error = Some("syntax error in Go source".to_string());
        }
        Self::walk_source(root, source, file_path, &mut index);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_function_and_import() {
        let mut adapter = GoAdapter::new().unwrap();
        let source = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n";
        let index = adapter.parse("main.go", source).unwrap();
        assert_eq!(index.imports.len(), 1);
        assert!(index.has_entry_guard);
    }
}
