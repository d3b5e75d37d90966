//! Python language adapter.

use tree_sitter::{Language, Node, Parser};

use crate::core::errors::{Result, VigilError};
use crate::lang::common::{
    EntityKind, ImportStatement, LanguageAdapter, ParseIndex, ParsedEntity, SourceLocation,
};

/// Tree-sitter backed adapter for Python source.
pub struct PythonAdapter {
    parser: Parser,
    language: Language,
}

impl PythonAdapter {
    /// Construct a new adapter, compiling the Python grammar into the
    /// parser.
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| VigilError::parse("python", format!("grammar load failed: {e}")))?;
        Ok(Self { parser, language })
    }

    fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
        node.utf8_text(source.as_bytes()).unwrap_or_default()
    }

    fn is_stub_body(body_text: &str) -> bool {
        let trimmed = body_text.trim();
        trimmed.is_empty()
            || trimmed == "pass"
            || trimmed.contains("NotImplementedError")
            || trimmed.contains("TODO")
            || trimmed.contains("FIXME")
    }

    fn preceding_docstring(node: Node, source: &str) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() == "expression_statement" {
            let expr = first.named_child(0)?;
            if expr.kind() == "string" {
                return Some(Self::node_text(expr, source).to_string());
            }
        }
        None
    }

    fn extract_calls(node: Node, source: &str, out: &mut Vec<String>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "call" {
                if let Some(func) = child.child_by_field_name("function") {
                    out.push(Self::node_text(func, source).to_string());
                }
            }
            Self::extract_calls(child, source, out);
        }
    }

    fn node_to_entity(node: Node, source: &str, file_path: &str) -> Option<ParsedEntity> {
        let kind = match node.kind() {
            "function_definition" => EntityKind::Function,
            "class_definition" => EntityKind::Class,
            _ => return None,
        };
        let name_node = node.child_by_field_name("name")?;
        let name = Self::node_text(name_node, source).to_string();
        let location =
            SourceLocation::from_rows(file_path, node.start_position().row, node.end_position().row);
        let doc = Self::preceding_docstring(node, source);
        let mut calls = Vec::new();
        Self::extract_calls(node, source, &mut calls);
        let body_text = Self::node_text(node, source);
        Some(ParsedEntity {
            kind,
            name,
            doc,
            calls,
            is_stub: Self::is_stub_body(body_text),
            location,
        })
    }

    fn extract_import(node: Node, source: &str) -> Vec<ImportStatement> {
        let line = node.start_position().row + 1;
        match node.kind() {
            "import_statement" => {
                let mut out = Vec::new();
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    out.push(ImportStatement {
                        module: Self::node_text(child, source).to_string(),
                        items: Vec::new(),
                        line,
                    });
                }
                out
            }
            "import_from_statement" => {
                let module = node
                    .child_by_field_name("module_name")
                    .map(|n| Self::node_text(n, source).to_string())
                    .unwrap_or_default();
                let mut items = Vec::new();
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if child.kind() == "dotted_name" || child.kind() == "identifier" {
                        let text = Self::node_text(child, source);
                        if text != module {
                            items.push(text.to_string());
                        }
                    }
                }
                vec![ImportStatement { module, items, line }]
            }
            _ => Vec::new(),
        }
    }

    fn walk_module(node: Node, source: &str, file_path: &str, index: &mut ParseIndex) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_definition" | "class_definition" => {
                    if let Some(entity) = Self::node_to_entity(child, source, file_path) {
                        index.entities.push(entity);
                    }
                }
                "import_statement" | "import_from_statement" => {
                    index.imports.extend(Self::extract_import(child, source));
                }
                "if_statement" => {
                    let cond = child.child_by_field_name("condition");
                    if let Some(cond) = cond {
                        let text = Self::node_text(cond, source);
                        if text.contains("__name__") && text.contains("__main__") {
                            index.has_entry_guard = true;
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
impl LanguageAdapter for PythonAdapter {
    fn language_name(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse(&mut self, file_path: &str, source: &str) -> Result<ParseIndex> {
        let _ = &self.language;
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| VigilError::parse("python", "tree-sitter returned no tree"))?;
        let root = tree.root_node();
        let mut index = ParseIndex::default();
        if Self::has_error(root) {
            index.parse_error = Some("syntax error in Python source".to_string());
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
        let mut adapter = PythonAdapter::new().unwrap();
        let source = "import os\nimport sys\n\ndef greet():\n    print(\"hi\")\n";
        let index = adapter.parse("greet.py", source).unwrap();
        assert!(index.parse_error.is_none());
        assert_eq!(index.imports.len(), 2);
        assert_eq!(index.entities.len(), 1);
        assert_eq!(index.entities[0].name, "greet");
    }

    #[test]
    fn detects_entry_guard() {
        let mut adapter = PythonAdapter::new().unwrap();
        let source = "if __name__ == \"__main__\":\n    pass\n";
        let index = adapter.parse("main.py", source).unwrap();
        assert!(index.has_entry_guard);
    }

    #[test]
    fn flags_syntax_errors_without_failing() {
        let mut adapter = PythonAdapter::new().unwrap();
        let source = "def broken(:\n";
        let index = adapter.parse("broken.py", source).unwrap();
        assert!(index.parse_error.is_some());
    }
}
