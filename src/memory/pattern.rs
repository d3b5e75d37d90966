//! Pattern Record: the unit of knowledge the Memory Store accumulates.

use serde::{Deserialize, Serialize};

use crate::analysis::issue::Severity;

/// The category a Pattern Record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// Security-relevant findings (hardcoded secrets, dangerous calls).
    Security,
    /// Performance anti-patterns.
    Performance,
    /// Resource/memory lifecycle issues.
    MemoryManagement,
    /// Parsing/syntax-level findings.
    Syntax,
    /// Patterns characteristic of AI-generated boilerplate.
    AiPatterns,
    /// Anything that doesn't fit a more specific category.
    General,
    /// A confirmed false positive, stored so the filter can suppress it.
    FalsePositive,
    /// Feedback recorded from a user's connection/integration decision.
    ConnectionFeedback,
}

/// A single durable unit of learned knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    /// `language_category_name`, unique within a language store.
    pub pattern_id: String,
    /// Language this pattern belongs to.
    pub language: String,
    /// Category.
    pub category: PatternCategory,
    /// Severity this pattern implies when matched.
    pub severity: Severity,
    /// The regex (or other matcher spec, serialized as a string) used to
    /// detect this pattern in source text.
    pub matcher: String,
    /// Suggested remediation text.
    pub suggestion: String,
    /// Longer explanatory content shown to the user.
    pub educational_content: String,
    /// Other languages this pattern is known to correlate with, via the
    /// Cross-Reference Index's universal concept key.
    pub cross_language_correlation: Option<String>,
    /// Dense embedding vector for semantic search. Empty when the
    /// Embedding Oracle is running in degraded (keyword-only) mode.
    pub embedding: Vec<f32>,
    /// Times this pattern's suggestion was accepted / led to a
    /// successful fix. Monotonically non-decreasing.
    pub success_count: u64,
    /// Times this pattern's suggestion was rejected or caused a
    /// regression. Monotonically non-decreasing.
    pub failure_count: u64,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last time this pattern was matched or updated (RFC 3339).
    pub last_used_at: String,
}

impl PatternRecord {
    /// Build the canonical `pattern_id` for a language/category/name
    /// triple.
    pub fn make_id(language: &str, category: PatternCategory, name: &str) -> String {
        format!("{language}_{}_{name}", category_slug(category))
    }

    /// Reuse rate used for stats/metrics: `success / (success + failure)`,
    /// with an unseen pattern reported as `0.0` rather than `NaN`.
    pub fn reuse_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    /// Whether this pattern is a pruning candidate: low quality and no
    /// recent use. Quality threshold `q` and the "stale" predicate
    /// (computed by the caller from `last_used_at`) are both inputs so
    /// store-level policy stays in [`crate::memory::store`].
    pub fn is_low_quality(&self, q: f64) -> bool {
        let total = self.success_count + self.failure_count;
        let score = self.success_count as f64 / (total as f64 + 1.0);
        score < q
    }
}

fn category_slug(category: PatternCategory) -> &'static str {
    match category {
        PatternCategory::Security => "security",
        PatternCategory::Performance => "performance",
        PatternCategory::MemoryManagement => "memory_management",
        PatternCategory::Syntax => "syntax",
        PatternCategory::AiPatterns => "ai_patterns",
        PatternCategory::General => "general",
        PatternCategory::FalsePositive => "false_positive",
        PatternCategory::ConnectionFeedback => "connection_feedback",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_rate_is_zero_when_unseen() {
        let record = PatternRecord {
            pattern_id: "python_security_x".into(),
            language: "python".into(),
            category: PatternCategory::Security,
            severity: Severity::High,
            matcher: String::new(),
            suggestion: String::new(),
            educational_content: String::new(),
            cross_language_correlation: None,
            embedding: Vec::new(),
            success_count: 0,
            failure_count: 0,
            created_at: String::new(),
            last_used_at: String::new(),
        };
        assert_eq!(record.reuse_rate(), 0.0);
    }

    #[test]
    fn make_id_is_stable() {
        let id = PatternRecord::make_id("python", PatternCategory::Security, "hardcoded_api_key");
        assert_eq!(id, "python_security_hardcoded_api_key");
    }
}
