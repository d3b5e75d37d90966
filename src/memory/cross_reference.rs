//! Cross-Reference Index: a global, read-mostly map from universal
//! concept key to the set of `(language, pattern_id)` pairs that
//! implement it. Eventually consistent — rebuilt by a background
//! reconciliation pass over each language store's patterns, never written
//! to directly by analyzer code (no direct cross-language writes).

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::memory::pattern::PatternRecord;

/// One `(language, pattern_id)` pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRefEntry {
    /// Language this pattern lives in.
    pub language: String,
    /// Pattern id within that language's store.
    pub pattern_id: String,
}

/// The index itself: concept key -> entries.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CrossReferenceIndex {
    entries: RwLock<HashMap<String, Vec<CrossRefEntry>>>,
}

impl CrossReferenceIndex {
    /// Construct an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild this language's contribution to the index from its
    /// current patterns. Only touches entries tagged with this
    /// language, so reconciling one language never drops another's
    /// pointers.
    pub fn reconcile_language(&self, language: &str, patterns: &[PatternRecord]) {
        let mut entries = self.entries.write();
        for bucket in entries.values_mut() {
            bucket.retain(|e| e.language != language);
        }
        for pattern in patterns {
            let Some(concept) = &pattern.cross_language_correlation else {
                continue;
            };
            entries
                .entry(concept.clone())
                .or_default()
                .push(CrossRefEntry {
                    language: language.to_string(),
                    pattern_id: pattern.pattern_id.clone(),
                });
        }
    }

    /// Concept keys whose text overlaps `query`'s tokens, used by
    /// `search_cross_language` to find candidate `(language,
    /// pattern_id)` pairs without requiring an exact concept-key match.
    pub fn matching_concepts(&self, query: &str) -> Vec<CrossRefEntry> {
        let query_lower = query.to_lowercase();
        let tokens: Vec<&str> = query_lower.split_whitespace().collect();
        let entries = self.entries.read();
        let mut out = Vec::new();
        for (concept, bucket) in entries.iter() {
            let concept_lower = concept.to_lowercase();
            if tokens.iter().any(|t| concept_lower.contains(t)) {
                out.extend(bucket.iter().cloned());
            }
        }
        out
    }

    /// Total entries across all concept keys, for `stats`.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    /// True if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::issue::Severity;
    use crate::memory::pattern::PatternCategory;

    fn pattern(language: &str, name: &str, concept: &str) -> PatternRecord {
        PatternRecord {
            pattern_id: PatternRecord::make_id(language, PatternCategory::Security, name),
            language: language.to_string(),
            category: PatternCategory::Security,
            severity: Severity::High,
            matcher: String::new(),
            suggestion: String::new(),
            educational_content: String::new(),
            cross_language_correlation: Some(concept.to_string()),
            embedding: Vec::new(),
            success_count: 0,
            failure_count: 0,
            created_at: String::new(),
            last_used_at: String::new(),
        }
    }

    #[test]
    fn reconciliation_is_isolated_per_language() {
        let index = CrossReferenceIndex::new();
        index.reconcile_language(
            "python",
            &[pattern("python", "credentials_exposure", "hardcoded api key")],
        );
        index.reconcile_language(
            "cpp",
            &[pattern("cpp", "credentials_exposure", "hardcoded api key")],
        );
        let results = index.matching_concepts("hardcoded API key");
        assert!(results.iter().any(|e| e.language == "python"));
        assert!(results.iter().any(|e| e.language == "cpp"));
    }

    #[test]
    fn reconciling_one_language_does_not_drop_another() {
        let index = CrossReferenceIndex::new();
        index.reconcile_language("python", &[pattern("python", "x", "concept")]);
        index.reconcile_language("cpp", &[pattern("cpp", "y", "concept")]);
        index.reconcile_language("python", &[]);
        let results = index.matching_concepts("concept");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].language, "cpp");
    }
}
