//! Memory Store (C1): per-language pattern storage with hybrid
//! embedding+metadata search, degrading to keyword matching when the
//! Embedding Oracle has no backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{Result, VigilError};
use crate::memory::cross_reference::CrossReferenceIndex;
use crate::memory::embedding::{keyword_score, EmbeddingOracle};
use crate::memory::pattern::{PatternCategory, PatternRecord};

/// Secondary key-value namespaces a language store keeps alongside its
/// patterns, per spec §3 (Language Store).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LanguageNamespaces {
    /// Confirmed false-positive signatures.
    pub false_positives: HashMap<String, Value>,
    /// Recorded issue validation decisions (user-confirmed true/false
    /// positives).
    pub issue_validations: HashMap<String, Value>,
    /// Context-specific suppression/adjustment rules.
    pub context_rules: HashMap<String, Value>,
    /// Fix Generator approval history: `(template_id, context_fingerprint) ->
    /// outcome`, used to prefer templates with a high approval rate and
    /// demote ones that have been rejected often in similar contexts.
    pub intelligent_fix_generator: HashMap<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LanguageStoreData {
    language: String,
    patterns: HashMap<String, PatternRecord>,
    namespaces: LanguageNamespaces,
    #[serde(skip)]
    read_only: bool,
}

/// A hybrid embedding+metadata search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Matched pattern id.
    pub pattern_id: String,
    /// Score in `[0, 1]`.
    pub score: f32,
    /// Category of the matched pattern, echoed for filtering by callers.
    pub category: PatternCategory,
}

/// Result of a `search`/`search_cross_language` call.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Ranked hits, highest score first, length at most `k`.
    pub hits: Vec<SearchHit>,
    /// True if no embedding backend was available and keyword matching
    /// was used instead.
    pub degraded: bool,
    /// True if the search's time budget was exhausted before every
    /// pattern could be scored; `hits` reflects only what was scored in
    /// time.
    pub partial: bool,
}

/// An open handle to one language's store. Obtained from
/// [`MemoryStore::open`]; there is no ambient/global store, every caller
/// holds an explicit handle.
#[derive(Clone)]
pub struct MemoryHandle {
    language: String,
    data: Arc<RwLock<LanguageStoreData>>,
    path: PathBuf,
    oracle: Arc<EmbeddingOracle>,
    search_timeout: Duration,
    max_patterns: usize,
}

impl MemoryHandle {
    /// Language this handle is scoped to.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Store a new pattern (or overwrite one with the same id).
    /// Language-isolated: this handle can only write into its own
    /// language's store.
    pub fn store(&self, mut pattern: PatternRecord) -> Result<String> {
        let mut data = self.data.write();
        if data.read_only {
            return Err(VigilError::corrupt_store(&self.language, "store is read-only"));
        }
        if pattern.language != self.language {
            return Err(VigilError::invalid_metadata(format!(
                "pattern language {} does not match handle language {}",
                pattern.language, self.language
            )));
        }
        if !data.patterns.contains_key(&pattern.pattern_id) && data.patterns.len() >= self.max_patterns {
            return Err(VigilError::MemoryFull {
                language: self.language.clone(),
            });
        }
        let now = Utc::now().to_rfc3339();
        if pattern.created_at.is_empty() {
            pattern.created_at = now.clone();
        }
        pattern.last_used_at = now;
        let id = pattern.pattern_id.clone();
        data.patterns.insert(id.clone(), pattern);
        drop(data);
        self.persist()?;
        Ok(id)
    }

    /// Hybrid embedding+metadata search within this language, bounded by
    /// the configured search timeout.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<PatternCategory>,
    ) -> Result<SearchResult> {
        let start = Instant::now();
        let data = self.data.read();
        if data.read_only {
            return Err(VigilError::corrupt_store(&self.language, "store is read-only"));
        }
        let degraded = self.oracle.is_degraded();
        let query_embedding = self.oracle.embed_one(query);
        let mut scored: Vec<SearchHit> = Vec::new();
        let mut partial = false;
        for pattern in data.patterns.values() {
            if start.elapsed() > self.search_timeout {
                partial = true;
                break;
            }
            if let Some(want) = filter {
                if pattern.category != want {
                    continue;
                }
            }
            let score = match (&query_embedding, pattern.embedding.is_empty()) {
                (Some(q), false) => EmbeddingOracle::cosine_similarity(q, &pattern.embedding),
                _ => keyword_score(query, &format!("{} {}", pattern.suggestion, pattern.educational_content)),
            };
            scored.push(SearchHit {
                pattern_id: pattern.pattern_id.clone(),
                score: score.clamp(0.0, 1.0),
                category: pattern.category,
            });
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(SearchResult {
            hits: scored,
            degraded,
            partial,
        })
    }

    /// Record a success/failure outcome against a pattern's counters.
    /// Counters are monotonically non-decreasing.
    pub fn update_quality(&self, pattern_id: &str, success: bool) -> Result<()> {
        let mut data = self.data.write();
        let pattern = data
            .patterns
            .get_mut(pattern_id)
            .ok_or_else(|| VigilError::not_found(pattern_id.to_string()))?;
        if success {
            pattern.success_count += 1;
        } else {
            pattern.failure_count += 1;
        }
        pattern.last_used_at = Utc::now().to_rfc3339();
        drop(data);
        self.persist()
    }

    /// Remove stale, low-quality patterns: `last_used_at` older than
    /// `stale_days` AND quality below `quality_threshold` AND zero
    /// recent usage (covered by the same staleness check).
    pub fn prune(&self, quality_threshold: f64, stale_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(stale_days);
        let mut data = self.data.write();
        let before = data.patterns.len();
        data.patterns.retain(|_, pattern| {
            let stale = chrono::DateTime::parse_from_rfc3339(&pattern.last_used_at)
                .map(|t| t.with_timezone(&Utc) < cutoff)
                .unwrap_or(false);
            !(stale && pattern.is_low_quality(quality_threshold))
        });
        let removed = before - data.patterns.len();
        drop(data);
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Access this language's secondary namespaces (false positives,
    /// issue validations, context rules) for read.
    pub fn namespaces(&self) -> LanguageNamespaces {
        self.data.read().namespaces.clone()
    }

    /// Write an entry into one of this language's secondary namespaces.
    pub fn put_namespace_entry(&self, namespace: Namespace, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.write();
        let bucket = match namespace {
            Namespace::FalsePositives => &mut data.namespaces.false_positives,
            Namespace::IssueValidations => &mut data.namespaces.issue_validations,
            Namespace::ContextRules => &mut data.namespaces.context_rules,
            Namespace::IntelligentFixGenerator => &mut data.namespaces.intelligent_fix_generator,
        };
        bucket.insert(key.to_string(), value);
        drop(data);
        self.persist()
    }

    /// Snapshot of every pattern currently stored, for cross-reference
    /// reconciliation and metrics.
    pub fn all_patterns(&self) -> Vec<PatternRecord> {
        self.data.read().patterns.values().cloned().collect()
    }

    /// Number of patterns, for `stats`.
    pub fn pattern_count(&self) -> usize {
        self.data.read().patterns.len()
    }

    fn persist(&self) -> Result<()> {
        let data = self.data.read();
        let json = serde_json::to_vec_pretty(&*data)?;
        drop(data);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("db.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Which secondary namespace a write targets.
#[derive(Debug, Clone, Copy)]
pub enum Namespace {
    /// `false_positives`.
    FalsePositives,
    /// `issue_validations`.
    IssueValidations,
    /// `context_rules`.
    ContextRules,
    /// `intelligent_fix_generator`.
    IntelligentFixGenerator,
}

/// Top-level Memory Store: opens per-language handles backed by
/// `stores/<language>/patterns.db`, and owns the shared Embedding Oracle
/// and Cross-Reference Index.
/// Default per-language pattern quota when a store is built without an
/// explicit [`MemoryStore::with_max_patterns`] override, mirroring
/// `MemoryConfig::max_patterns_per_language`'s default.
const DEFAULT_MAX_PATTERNS_PER_LANGUAGE: usize = 50_000;

pub struct MemoryStore {
    data_dir: PathBuf,
    oracle: Arc<EmbeddingOracle>,
    search_timeout: Duration,
    max_patterns: usize,
    handles: RwLock<HashMap<String, MemoryHandle>>,
    cross_reference: Arc<CrossReferenceIndex>,
}

impl MemoryStore {
    /// Construct a store rooted at `data_dir` (tests use a temp dir;
    /// there is no process-wide singleton). Each language store's
    /// pattern quota defaults to [`DEFAULT_MAX_PATTERNS_PER_LANGUAGE`];
    /// use [`MemoryStore::with_max_patterns`] to apply a configured
    /// value.
    pub fn new(data_dir: impl Into<PathBuf>, oracle: Arc<EmbeddingOracle>, search_timeout: Duration) -> Self {
        Self {
            data_dir: data_dir.into(),
            oracle,
            search_timeout,
            max_patterns: DEFAULT_MAX_PATTERNS_PER_LANGUAGE,
            handles: RwLock::new(HashMap::new()),
            cross_reference: Arc::new(CrossReferenceIndex::new()),
        }
    }

    /// Override the per-language pattern quota (`MemoryConfig::
    /// max_patterns_per_language`). Only affects handles opened after
    /// this call.
    pub fn with_max_patterns(mut self, max_patterns: usize) -> Self {
        self.max_patterns = max_patterns;
        self
    }

    /// The shared Cross-Reference Index.
    pub fn cross_reference(&self) -> Arc<CrossReferenceIndex> {
        self.cross_reference.clone()
    }

    /// Open (creating on first use) the handle for `language`, loading
    /// its on-disk state if present. A store whose on-disk schema fails
    /// to parse is opened read-only and [`VigilError::CorruptStore`] is
    /// logged rather than aborting the whole run.
    pub fn open(&self, language: &str) -> Result<MemoryHandle> {
        if let Some(handle) = self.handles.read().get(language) {
            return Ok(handle.clone());
        }
        let path = self.store_path(language);
        let (loaded, read_only) = if path.exists() {
            match std::fs::read(&path) {
                Ok(bytes) => match serde_json::from_slice::<LanguageStoreData>(&bytes) {
                    Ok(data) => (data, false),
                    Err(err) => {
                        tracing::warn!(language, error = %err, "language store corrupt, opening read-only");
                        (
                            LanguageStoreData {
                                language: language.to_string(),
                                ..Default::default()
                            },
                            true,
                        )
                    }
                },
                Err(_) => (
                    LanguageStoreData {
                        language: language.to_string(),
                        ..Default::default()
                    },
                    false,
                ),
            }
        } else {
            (
                LanguageStoreData {
                    language: language.to_string(),
                    ..Default::default()
                },
                false,
            )
        };
        let mut data = loaded;
        data.read_only = read_only;
        let handle = MemoryHandle {
            language: language.to_string(),
            data: Arc::new(RwLock::new(data)),
            path,
            oracle: self.oracle.clone(),
            search_timeout: self.search_timeout,
            max_patterns: self.max_patterns,
        };
        self.handles.write().insert(language.to_string(), handle.clone());
        Ok(handle)
    }

    /// Search every open language's store for `query`, returning the
    /// top `k` hits per language that the Cross-Reference Index links to
    /// a matching concept, plus (to keep the "appears in bucket,
    /// possibly empty" contract) an entry for every currently open
    /// language even if it has no hits.
    pub fn search_cross_language(&self, query: &str, k: usize) -> HashMap<String, SearchResult> {
        let mut by_language: HashMap<String, Vec<String>> = HashMap::new();
        for entry in self.cross_reference.matching_concepts(query) {
            by_language.entry(entry.language).or_default().push(entry.pattern_id);
        }
        let mut results = HashMap::new();
        for (language, handle) in self.handles.read().iter() {
            let mut hits: Vec<SearchHit> = Vec::new();
            let degraded = self.oracle.is_degraded();
            if let Some(candidate_ids) = by_language.get(language) {
                let data = handle.data.read();
                for id in candidate_ids {
                    if let Some(pattern) = data.patterns.get(id) {
                        let query_embedding = self.oracle.embed_one(query);
                        let score = match (&query_embedding, pattern.embedding.is_empty()) {
                            (Some(q), false) => EmbeddingOracle::cosine_similarity(q, &pattern.embedding),
                            _ => keyword_score(query, &pattern.educational_content),
                        };
                        hits.push(SearchHit {
                            pattern_id: pattern.pattern_id.clone(),
                            score: score.clamp(0.0, 1.0),
                            category: pattern.category,
                        });
                    }
                }
            }
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(k);
            results.insert(
                language.clone(),
                SearchResult {
                    hits,
                    degraded,
                    partial: false,
                },
            );
        }
        results
    }

    /// Rebuild the Cross-Reference Index from every open language's
    /// current patterns.
    pub fn reconcile_cross_reference(&self) {
        for (language, handle) in self.handles.read().iter() {
            self.cross_reference.reconcile_language(language, &handle.all_patterns());
        }
    }

    fn store_path(&self, language: &str) -> PathBuf {
        self.data_dir.join("stores").join(language).join("patterns.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::issue::Severity;

    fn sample_pattern(language: &str) -> PatternRecord {
        PatternRecord {
            pattern_id: PatternRecord::make_id(language, PatternCategory::Security, "hardcoded_api_key"),
            language: language.to_string(),
            category: PatternCategory::Security,
            severity: Severity::Critical,
            matcher: String::new(),
            suggestion: "remove hardcoded secret".to_string(),
            educational_content: "hardcoded API key in source".to_string(),
            cross_language_correlation: Some("hardcoded api key".to_string()),
            embedding: Vec::new(),
            success_count: 0,
            failure_count: 0,
            created_at: String::new(),
            last_used_at: Utc::now().to_rfc3339(),
        }
    }

    fn store() -> MemoryStore {
        let dir = tempfile::tempdir().unwrap();
        MemoryStore::new(
            dir.into_path(),
            Arc::new(EmbeddingOracle::new(None)),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn store_rejects_new_patterns_once_quota_is_reached() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(
            dir.into_path(),
            Arc::new(EmbeddingOracle::new(None)),
            Duration::from_secs(2),
        )
        .with_max_patterns(2);
        let handle = store.open("python").unwrap();

        for i in 0..2 {
            let mut p = sample_pattern("python");
            p.pattern_id = format!("python_security_key_{i}");
            handle.store(p).unwrap();
        }

        let mut overflow = sample_pattern("python");
        overflow.pattern_id = "python_security_key_overflow".to_string();
        let err = handle.store(overflow).unwrap_err();
        assert!(matches!(err, VigilError::MemoryFull { language } if language == "python"));
    }

    #[test]
    fn store_allows_overwriting_an_existing_id_at_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(
            dir.into_path(),
            Arc::new(EmbeddingOracle::new(None)),
            Duration::from_secs(2),
        )
        .with_max_patterns(1);
        let handle = store.open("python").unwrap();
        handle.store(sample_pattern("python")).unwrap();
        assert!(handle.store(sample_pattern("python")).is_ok());
    }

    #[test]
    fn store_then_search_exact_content_returns_top_hit() {
        let store = store();
        let handle = store.open("python").unwrap();
        let id = handle.store(sample_pattern("python")).unwrap();
        let result = handle.search("hardcoded API key", 3, None).unwrap();
        assert_eq!(result.hits.first().map(|h| h.pattern_id.clone()), Some(id));
    }

    #[test]
    fn search_results_are_bounded_and_sorted() {
        let store = store();
        let handle = store.open("python").unwrap();
        for i in 0..5 {
            let mut p = sample_pattern("python");
            p.pattern_id = format!("python_security_key_{i}");
            handle.store(p).unwrap();
        }
        let result = handle.search("hardcoded API key", 3, None).unwrap();
        assert!(result.hits.len() <= 3);
        for pair in result.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn cross_language_search_includes_cpp_bucket() {
        let store = store();
        let py = store.open("python").unwrap();
        let cpp = store.open("cpp").unwrap();
        py.store(sample_pattern("python")).unwrap();
        cpp.store(sample_pattern("cpp")).unwrap();
        store.reconcile_cross_reference();
        let results = store.search_cross_language("hardcoded API key", 3);
        assert!(results.contains_key("cpp"));
        let python_hits = &results["python"];
        assert!(python_hits.hits.first().map(|h| h.score > 0.5).unwrap_or(false));
    }

    #[test]
    fn language_writes_stay_isolated() {
        let store = store();
        let python = store.open("python").unwrap();
        let mut cpp_pattern = sample_pattern("cpp");
        cpp_pattern.language = "cpp".to_string();
        assert!(python.store(cpp_pattern).is_err());
    }
}
