//! The `Issue` data type emitted by every Language Analyzer.

use serde::{Deserialize, Serialize};

/// Severity of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Lowest severity: style nits, minor stub markers.
    Low,
    /// Worth fixing but not urgent.
    Medium,
    /// Should be fixed soon; weighed in non-regression checks.
    High,
    /// Must be fixed; weighed in non-regression checks.
    Critical,
}

/// A single finding from a Language Analyzer.
///
/// `(file_path, line, issue_type)` uniquely identifies an Issue within one
/// analysis run and is stable across runs over unchanged source, which is
/// what lets the False-Positive Filter and the recursive-improvement
/// non-regression check compare issue sets between passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Machine-readable issue type, e.g. `unused_import`,
    /// `hardcoded_credential`.
    #[serde(rename = "type")]
    pub issue_type: String,
    /// Path of the file the issue was found in, relative to the
    /// analyzed root.
    pub file_path: String,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number, when known.
    pub column: Option<usize>,
    /// Severity.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
    /// Longer explanation of why this matters.
    pub educational_content: String,
    /// Suggested fix text, if a Fix Proposal can plausibly be generated.
    pub suggestion: Option<String>,
    /// Pattern Record ids judged similar to this issue by the Memory
    /// Store.
    pub similar_patterns: Vec<String>,
    /// Free-form tags carried through to the Code Connector / reports.
    pub context_tags: Vec<String>,
}

impl Issue {
    /// The `(file_path, line, type)` identity tuple used for dedup,
    /// cross-run comparison, and the False-Positive Filter's signature.
    pub fn identity(&self) -> (String, usize, String) {
        (self.file_path.clone(), self.line, self.issue_type.clone())
    }

    /// True for [`Severity::Critical`] or [`Severity::High`] — the
    /// counted set for the orchestrator's non-regression check.
    pub fn counts_toward_regression(&self) -> bool {
        matches!(self.severity, Severity::Critical | Severity::High)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Issue {
        Issue {
            issue_type: "unused_import".into(),
            file_path: "a.py".into(),
            line: 1,
            column: None,
            severity: Severity::Low,
            description: "unused import 'os'".into(),
            educational_content: String::new(),
            suggestion: Some("remove the import".into()),
            similar_patterns: Vec::new(),
            context_tags: Vec::new(),
        }
    }

    #[test]
    fn identity_matches_spec_tuple() {
        let issue = sample();
        assert_eq!(
            issue.identity(),
            ("a.py".to_string(), 1, "unused_import".to_string())
        );
    }

    #[test]
    fn severity_ordering_puts_critical_highest() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
