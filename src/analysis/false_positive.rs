//! False-Positive Filter (C6): suppresses Issues matching learned
//! negative patterns, and promotes "silently fixed between scans" issues
//! into positive training signal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::issue::Issue;
use crate::core::errors::Result;
use crate::memory::{MemoryHandle, Namespace};

/// A confirmed-false-positive record keyed by `(type, file context,
/// normalized line content)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FalsePositiveRecord {
    /// Issue type this record suppresses.
    pub issue_type: String,
    /// Normalized source line content the record matches against.
    pub normalized_line: String,
    /// Directory-level file context (e.g. `tests/`) the record applies
    /// within, or empty for any context.
    pub normalized_context: String,
    /// Whether a user explicitly confirmed this as a false positive.
    pub confirmed: bool,
}

impl FalsePositiveRecord {
    fn signature(issue_type: &str, context: &str, line: &str) -> String {
        format!("{issue_type}::{context}::{}", normalize_line(line))
    }
}

fn normalize_line(line: &str) -> String {
    line.trim().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn file_context(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

/// Filters a batch of Issues against a language's `false_positives`
/// namespace.
pub struct FalsePositiveFilter;

impl FalsePositiveFilter {
    /// Drop Issues that match a `confirmed=true` record. `source_lines`
    /// gives the filter the raw line text each Issue points at, since
    /// normalization needs the actual source.
    pub fn filter(local_store: &MemoryHandle, issues: Vec<Issue>, source_lines: &[String]) -> Vec<Issue> {
        let namespaces = local_store.namespaces();
        issues
            .into_iter()
            .filter(|issue| {
                let line_text = source_lines.get(issue.line.saturating_sub(1)).map(String::as_str).unwrap_or("");
                let context = file_context(&issue.file_path);
                let signature = FalsePositiveRecord::signature(&issue.issue_type, &context, line_text);
                match namespaces.false_positives.get(&signature) {
                    Some(value) => !is_confirmed(value),
                    None => true,
                }
            })
            .collect()
    }

    /// Record a user's explicit false-positive confirmation.
    pub fn confirm_false_positive(local_store: &MemoryHandle, issue: &Issue, line_text: &str) -> Result<()> {
        let context = file_context(&issue.file_path);
        let signature = FalsePositiveRecord::signature(&issue.issue_type, &context, line_text);
        let record = FalsePositiveRecord {
            issue_type: issue.issue_type.clone(),
            normalized_line: normalize_line(line_text),
            normalized_context: context,
            confirmed: true,
        };
        local_store.put_namespace_entry(
            Namespace::FalsePositives,
            &signature,
            serde_json::to_value(record)?,
        )
    }

    /// Record that an Issue present in scan N was absent (without an
    /// automated patch) in scan N+1: a positive signal that the issue
    /// type is a real, auto-fixable finding rather than noise.
    pub fn record_manual_fix(local_store: &MemoryHandle, issue: &Issue, line_text: &str) -> Result<()> {
        let context = file_context(&issue.file_path);
        let signature = FalsePositiveRecord::signature(&issue.issue_type, &context, line_text);
        let record = FalsePositiveRecord {
            issue_type: issue.issue_type.clone(),
            normalized_line: normalize_line(line_text),
            normalized_context: context,
            confirmed: false,
        };
        local_store.put_namespace_entry(
            Namespace::IssueValidations,
            &signature,
            serde_json::to_value(record)?,
        )
    }
}

fn is_confirmed(value: &Value) -> bool {
    value.get("confirmed").and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::issue::Severity;
    use crate::memory::{EmbeddingOracle, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn handle() -> MemoryHandle {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.into_path(), Arc::new(EmbeddingOracle::new(None)), Duration::from_secs(2));
        store.open("python").unwrap()
    }

    fn issue() -> Issue {
        Issue {
            issue_type: "hardcoded_password".into(),
            file_path: "tests/fixture.py".into(),
            line: 3,
            column: None,
            severity: Severity::Critical,
            description: String::new(),
            educational_content: String::new(),
            suggestion: None,
            similar_patterns: Vec::new(),
            context_tags: Vec::new(),
        }
    }

    #[test]
    fn confirmed_false_positive_is_suppressed() {
        let handle = handle();
        let lines = vec![String::new(), String::new(), "password = \"test\"".to_string()];
        FalsePositiveFilter::confirm_false_positive(&handle, &issue(), &lines[2]).unwrap();
        let filtered = FalsePositiveFilter::filter(&handle, vec![issue()], &lines);
        assert!(filtered.is_empty());
    }

    #[test]
    fn unconfirmed_issue_passes_through() {
        let handle = handle();
        let lines = vec![String::new(), String::new(), "password = \"test\"".to_string()];
        let filtered = FalsePositiveFilter::filter(&handle, vec![issue()], &lines);
        assert_eq!(filtered.len(), 1);
    }
}
