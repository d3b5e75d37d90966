//! Language Analyzer (C4): the per-language contract for turning parsed
//! source into Issues and teaching the Memory Store what it found.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::issue::{Issue, Severity};
use crate::core::errors::Result;
use crate::lang::common::{ImportStatement, LanguageAdapter, ParseIndex};
use crate::memory::{MemoryHandle, PatternCategory, PatternRecord};

/// Implemented once per supported language; registered in the
/// [`crate::analysis::registry::AnalyzerRegistry`] keyed by file extension.
#[async_trait]
pub trait LanguageAnalyzer: Send + Sync {
    /// Canonical language key, matching the adapter and Memory Store
    /// namespace.
    fn language_name(&self) -> &'static str;

    /// Extensions this analyzer handles, without the leading dot.
    fn file_extensions(&self) -> &'static [&'static str];

    /// Analyze one file's content, given read-only handles to this
    /// language's store and (for correlation lookups only) the shared
    /// store facade.
    fn analyze_file(&self, path: &str, content: &str, local_store: &MemoryHandle) -> Result<Vec<Issue>>;

    /// Record newly observed patterns from this batch's issues into the
    /// local store so future runs can recognize them faster and surface
    /// `similar_patterns`.
    fn learn_from_analysis(&self, issues: &[Issue], local_store: &MemoryHandle) -> Result<()>;

    /// Pattern ids judged similar to `issue_type`, used to populate
    /// `Issue::similar_patterns`.
    fn get_similar_patterns(&self, issue_type: &str, local_store: &MemoryHandle) -> Vec<String>;

    /// Other languages this analyzer's categories are known to correlate
    /// with, via the Cross-Reference Index's universal concept keys.
    fn get_cross_language_correlations(&self) -> Vec<&'static str>;
}

struct RegexCheck {
    pattern: &'static Lazy<Regex>,
    issue_type: &'static str,
    severity: Severity,
    category: PatternCategory,
    description: &'static str,
    educational_content: &'static str,
    concept: &'static str,
}

static HARDCODED_API_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(api[_-]?key|secret[_-]?key|access[_-]?token)\s*[:=]\s*["'][A-Za-z0-9_\-]{12,}["']"#)
        .expect("valid regex")
});

static HARDCODED_PASSWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)password\s*[:=]\s*["'][^"']{4,}["']"#).expect("valid regex")
});

static TODO_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(TODO|FIXME|XXX)\b").expect("valid regex"));

static SHELL_TRUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"shell\s*=\s*True").expect("valid regex"));

fn checks() -> &'static [RegexCheck] {
    static CHECKS: Lazy<Vec<RegexCheck>> = Lazy::new(|| {
        vec![
            RegexCheck {
                pattern: &HARDCODED_API_KEY,
                issue_type: "hardcoded_api_key",
                severity: Severity::Critical,
                category: PatternCategory::Security,
                description: "hardcoded API key or access token in source",
                educational_content: "Credentials committed to source control are recoverable from git history even after removal. Load secrets from environment variables or a secrets manager instead.",
                concept: "hardcoded api key",
            },
            RegexCheck {
                pattern: &HARDCODED_PASSWORD,
                issue_type: "hardcoded_password",
                severity: Severity::Critical,
                category: PatternCategory::Security,
                description: "hardcoded password literal in source",
                educational_content: "Hardcoded passwords are visible to anyone with source access and cannot be rotated without a code change.",
                concept: "hardcoded password",
            },
            RegexCheck {
                pattern: &SHELL_TRUE,
                issue_type: "shell_injection_risk",
                severity: Severity::High,
                category: PatternCategory::Security,
                description: "subprocess invoked with shell=True",
                educational_content: "shell=True interpolates the command string through a shell, which can enable injection if any part is user-controlled.",
                concept: "shell injection",
            },
        ]
    });
    &CHECKS
}

/// A regex+AST driven analyzer shared by every language adapter: regex
/// checks run over raw source text, AST-derived checks (stub bodies,
/// parse errors) run over the adapter's [`ParseIndex`].
pub struct StandardAnalyzer {
    language: &'static str,
    extensions: &'static [&'static str],
}

impl StandardAnalyzer {
    /// Build the standard analyzer for one language/extension set.
    pub fn new(language: &'static str, extensions: &'static [&'static str]) -> Self {
        Self { language, extensions }
    }

    fn ast_issues(&self, path: &str, index: &ParseIndex) -> Vec<Issue> {
        let mut issues = Vec::new();
        if let Some(message) = &index.parse_error {
            issues.push(Issue {
                issue_type: "parse_error".to_string(),
                file_path: path.to_string(),
                line: 1,
                column: None,
                severity: Severity::Critical,
                description: format!("file failed to parse: {message}"),
                educational_content: "Static analysis cannot reliably inspect a file tree-sitter failed to parse. Fix the syntax error first.".to_string(),
                suggestion: None,
                similar_patterns: Vec::new(),
                context_tags: Vec::new(),
            });
        }
        for entity in index.callables() {
            if entity.is_stub {
                issues.push(Issue {
                    issue_type: "stub_implementation".to_string(),
                    file_path: path.to_string(),
                    line: entity.location.start_line,
                    column: None,
                    severity: Severity::Low,
                    description: format!("'{}' has an empty or stub body", entity.name),
                    educational_content: "Stub bodies (pass/TODO/unimplemented!()) are candidates the Code Connector can pair with an orphan file that implements the missing behavior.".to_string(),
                    suggestion: None,
                    similar_patterns: Vec::new(),
                    context_tags: Vec::new(),
                });
            }
        }
        issues
    }

    fn unused_import_issues(&self, path: &str, content: &str, index: &ParseIndex) -> Vec<Issue> {
        let mut issues = Vec::new();
        for import in &index.imports {
            let name = whole_module_name(import);
            if name.is_empty() || is_used_outside_import_line(content, &name, import.line) {
                continue;
            }
            issues.push(Issue {
                issue_type: "unused_import".to_string(),
                file_path: path.to_string(),
                line: import.line,
                column: None,
                severity: Severity::Low,
                description: format!("'{name}' is imported but never referenced"),
                educational_content: "Unused imports add noise and can hide which dependencies a file actually needs.".to_string(),
                suggestion: Some(format!("remove the unused import of '{name}'")),
                similar_patterns: Vec::new(),
                context_tags: Vec::new(),
            });
        }
        issues
    }

    fn regex_issues(&self, path: &str, content: &str) -> Vec<Issue> {
        let mut issues = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            for check in checks() {
                if check.pattern.is_match(line) {
                    issues.push(Issue {
                        issue_type: check.issue_type.to_string(),
                        file_path: path.to_string(),
                        line: line_no + 1,
                        column: None,
                        severity: check.severity,
                        description: check.description.to_string(),
                        educational_content: check.educational_content.to_string(),
                        suggestion: None,
                        similar_patterns: Vec::new(),
                        context_tags: Vec::new(),
                    });
                }
            }
            if TODO_MARKER.is_match(line) {
                issues.push(Issue {
                    issue_type: "todo_marker".to_string(),
                    file_path: path.to_string(),
                    line: line_no + 1,
                    column: None,
                    severity: Severity::Low,
                    description: "TODO/FIXME marker left in source".to_string(),
                    educational_content: String::new(),
                    suggestion: None,
                    similar_patterns: Vec::new(),
                    context_tags: Vec::new(),
                });
            }
        }
        issues
    }
}

#[async_trait]
impl LanguageAnalyzer for StandardAnalyzer {
    fn language_name(&self) -> &'static str {
        self.language
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn analyze_file(&self, path: &str, content: &str, local_store: &MemoryHandle) -> Result<Vec<Issue>> {
        let mut adapter = crate::lang::registry::adapter_for_language(self.language)?;
        let index = adapter.parse(path, content)?;
        let mut issues = self.regex_issues(path, content);
        issues.extend(self.ast_issues(path, &index));
        issues.extend(self.unused_import_issues(path, content, &index));
        for issue in &mut issues {
            issue.similar_patterns = self.get_similar_patterns(&issue.issue_type, local_store);
        }
        Ok(issues)
    }

    fn learn_from_analysis(&self, issues: &[Issue], local_store: &MemoryHandle) -> Result<()> {
        for issue in issues {
            let category = category_for_issue(&issue.issue_type);
            let concept = checks()
                .iter()
                .find(|c| c.issue_type == issue.issue_type)
                .map(|c| c.concept.to_string());
            let pattern_id = PatternRecord::make_id(self.language, category, &issue.issue_type);
            local_store.store(PatternRecord {
                pattern_id,
                language: self.language.to_string(),
                category,
                severity: issue.severity,
                matcher: issue.issue_type.clone(),
                suggestion: issue.suggestion.clone().unwrap_or_default(),
                educational_content: issue.educational_content.clone(),
                cross_language_correlation: concept,
                embedding: Vec::new(),
                success_count: 0,
                failure_count: 0,
                created_at: String::new(),
                last_used_at: String::new(),
            })?;
        }
        Ok(())
    }

    fn get_similar_patterns(&self, issue_type: &str, local_store: &MemoryHandle) -> Vec<String> {
        local_store
            .search(issue_type, 5, None)
            .map(|result| result.hits.into_iter().map(|h| h.pattern_id).collect())
            .unwrap_or_default()
    }

    fn get_cross_language_correlations(&self) -> Vec<&'static str> {
        crate::lang::registry::SUPPORTED_LANGUAGES
            .iter()
            .filter(|&&lang| lang != self.language)
            .copied()
            .collect()
    }
}

fn category_for_issue(issue_type: &str) -> PatternCategory {
    match issue_type {
        "hardcoded_api_key" | "hardcoded_password" | "shell_injection_risk" => PatternCategory::Security,
        "parse_error" => PatternCategory::Syntax,
        "stub_implementation" | "todo_marker" => PatternCategory::AiPatterns,
        _ => PatternCategory::General,
    }
}

/// The bare module/package name for a whole-module import (`import os`,
/// `use std::fs;`). Returns an empty string for `from x import y`-style
/// imports with named items, since removing those safely requires knowing
/// which of several bindings is unused — left to a future, more precise
/// pass rather than risked as a heuristic deletion.
fn whole_module_name(import: &ImportStatement) -> String {
    if !import.items.is_empty() {
        return String::new();
    }
    import
        .module
        .split(&['.', ':', '/'][..])
        .last()
        .unwrap_or(&import.module)
        .to_string()
}

/// Whether `name` appears as a whole word on any line other than
/// `import_line` (1-based). A conservative, adapter-agnostic proxy for
/// "is this import actually used" that never needs a full symbol table.
fn is_used_outside_import_line(content: &str, name: &str, import_line: usize) -> bool {
    let pattern = format!(r"\b{}\b", regex::escape(name));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return true,
    };
    content
        .lines()
        .enumerate()
        .any(|(idx, line)| idx + 1 != import_line && re.is_match(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn handle() -> MemoryHandle {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(
            dir.into_path(),
            Arc::new(crate::memory::EmbeddingOracle::new(None)),
            Duration::from_secs(2),
        );
        store.open("python").unwrap()
    }

    #[test]
    fn detects_hardcoded_api_key() {
        let analyzer = StandardAnalyzer::new("python", &["py"]);
        let handle = handle();
        let issues = analyzer
            .analyze_file("a.py", "api_key = \"sk-abcdefghijklmnop\"\n", &handle)
            .unwrap();
        assert!(issues.iter().any(|i| i.issue_type == "hardcoded_api_key"));
    }

    #[test]
    fn parse_error_becomes_critical_issue() {
        let analyzer = StandardAnalyzer::new("python", &["py"]);
        let handle = handle();
        let issues = analyzer.analyze_file("a.py", "def f(:\n", &handle).unwrap();
        assert!(issues
            .iter()
            .any(|i| i.issue_type == "parse_error" && i.severity == Severity::Critical));
    }

    #[test]
    fn unused_whole_module_import_is_flagged() {
        let analyzer = StandardAnalyzer::new("python", &["py"]);
        let handle = handle();
        let issues = analyzer
            .analyze_file("a.py", "import os\nimport sys\n\nprint(sys.argv)\n", &handle)
            .unwrap();
        let unused: Vec<&Issue> = issues.iter().filter(|i| i.issue_type == "unused_import").collect();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].line, 1);
    }

    #[test]
    fn learning_then_searching_returns_the_pattern() {
        let analyzer = StandardAnalyzer::new("python", &["py"]);
        let handle = handle();
        let issues = analyzer
            .analyze_file("a.py", "api_key = \"sk-abcdefghijklmnop\"\n", &handle)
            .unwrap();
        analyzer.learn_from_analysis(&issues, &handle).unwrap();
        let similar = analyzer.get_similar_patterns("hardcoded_api_key", &handle);
        assert!(!similar.is_empty());
    }
}
