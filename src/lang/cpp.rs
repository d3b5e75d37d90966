//! C++ language adapter.

use tree_sitter::{Language, Node, Parser};

use crate::core::errors::{Result, VigilError};
use crate::lang::common::{
    EntityKind, ImportStatement, LanguageAdapter, ParseIndex, ParsedEntity, SourceLocation,
};

/// Tree-sitter backed adapter for C++ source.
pub struct CppAdapter {
    parser: Parser,
}

impl CppAdapter {
    /// Construct a new adapter.
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_cpp::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| VigilError::parse("cpp", format!("grammar load failed: {e}")))?;
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

    fn function_name(node: Node, source: &str) -> Option<String> {
        let declarator = node.child_by_field_name("declarator")?;
        Self::unwrap_declarator_name(declarator, source)
    }

    fn unwrap_declarator_name(node: Node, source: &str) -> Option<String> {
        match node.kind() {
            "identifier" | "field_identifier" | "qualified_identifier" => {
                Some(Self::node_text(node, source).to_string())
            }
            "function_declarator" | "pointer_declarator" | "reference_declarator" => {
                let inner = node.child_by_field_name("declarator")?;
                Self::unwrap_declarator_name(inner, source)
            }
            _ => None,
        }
    }

    fn is_stub_body(node: Node, source: &str) -> bool {
        let body = node.child_by_field_name("body");
        match body {
            Some(b) => {
                let text = Self::node_text(b, source);
                text.trim() == "{}" || text.trim() == "{ }" || text.contains("TODO")
            }
            None => false,
        }
    }

    fn walk_source(node: Node, source: &str, file_path: &str, index: &mut ParseIndex) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_definition" => {
                    if let Some(name) = Self::function_name(child, source) {
                        if name == "main" {
                            index.has_entry_guard = true;
                        }
                        let location = SourceLocation::from_rows(
                            file_path,
                            child.start_position().row,
                            child.end_position().row,
                        );
                        let mut calls = Vec::new();
                        Self::extract_calls(child, source, &mut calls);
                        index.entities.push(ParsedEntity {
                            kind: EntityKind::Function,
                            name,
                            doc: None,
                            calls,
                            is_stub: Self::is_stub_body(child, source),
                            location,
                        });
                    }
                    Self::walk_source(child, source, file_path, index);
                }
                "class_specifier" | "struct_specifier" => {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        index.entities.push(ParsedEntity {
                            kind: EntityKind::Class,
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
                    Self::walk_source(child, source, file_path, index);
                }
                "namespace_definition" | "linkage_specification" | "declaration_list" => {
                    Self::walk_source(child, source, file_path, index);
                }
                "preproc_include" => {
                    let line = child.start_position().row + 1;
                    let module = Self::node_text(child, source)
                        .trim_start_matches("#include")
                        .trim()
                        .trim_matches(|c| c == '<' || c == '>' || c == '"')
                        .to_string();
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
impl LanguageAdapter for CppAdapter {
    fn language_name(&self) -> &'static str {
        "cpp"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["cpp", "cc", "cxx", "hpp", "hh", "h"]
    }

    fn parse(&mut self, file_path: &str, source: &str) -> Result<ParseIndex> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| VigilError::parse("cpp", "tree-sitter returned no tree"))?;
        let root = tree.root_node();
        let mut index = ParseIndex::default();
        if Self::has_error(root) {
            index.parse_error = Some("syntax error in C++ source".to_string());
        }
        Self::walk_source(root, source, file_path, &mut index);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_function_and_include() {
        let mut adapter = CppAdapter::new().unwrap();
        let source = "#include <cstdio>\n\nint main() {\n  printf(\"hi\");\n  return 0;\n}\n";
        let index = adapter.parse("main.cpp", source).unwrap();
        assert_eq!(index.imports.len(), 1);
        assert!(index.has_entry_guard);
    }

    #[test]
    fn extracts_class() {
        let mut adapter = CppAdapter::new().unwrap();
        let source = "class Widget {\npublic:\n  void spin();\n};\n";
        let index = adapter.parse("widget.hpp", source).unwrap();
        assert!(index.entities.iter().any(|e| e.name == "Widget"));
    }
}
