//! Embedding Oracle (C2): a pure, deterministic `text -> R^D` function
//! backing the Memory Store's semantic search, with a degraded
//! keyword-only fallback when no embedding backend is available.

use std::collections::HashMap;
use std::sync::RwLock;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use xxhash_rust::xxh3::xxh3_64;

use crate::core::errors::Result;

/// Fixed embedding dimensionality for the default model. Swapping the
/// embedding model must keep `D` constant, or every language store's
/// index needs a full rebuild.
pub const EMBEDDING_DIM: usize = 384;

/// Cache capacity before the oracle evicts half its entries.
const CACHE_CAPACITY: usize = 4_096;

struct EmbeddingCache {
    entries: HashMap<u64, Vec<f32>>,
    hits: u64,
    misses: u64,
}

impl EmbeddingCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: u64) -> Option<Vec<f32>> {
        match self.entries.get(&key) {
            Some(v) => {
                self.hits += 1;
                Some(v.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, key: u64, value: Vec<f32>) {
        if self.entries.len() >= CACHE_CAPACITY {
            let half: Vec<u64> = self.entries.keys().take(CACHE_CAPACITY / 2).copied().collect();
            for k in half {
                self.entries.remove(&k);
            }
        }
        self.entries.insert(key, value);
    }
}

/// Produces text embeddings, or degrades to `None` (keyword-only mode)
/// when the backend can't be initialized.
pub struct EmbeddingOracle {
    model: Option<RwLock<TextEmbedding>>,
    cache: RwLock<EmbeddingCache>,
}

impl EmbeddingOracle {
    /// Attempt to load the default embedding model. On failure (offline,
    /// no cached weights, unsupported platform) logs a warning and
    /// returns an oracle that reports [`EmbeddingOracle::is_degraded`].
    pub fn new(model_cache_dir: Option<&std::path::Path>) -> Self {
        let mut options = InitOptions::new(EmbeddingModel::AllMiniLML6V2);
        if let Some(dir) = model_cache_dir {
            options = options.with_cache_dir(dir.to_path_buf());
        }
        let model = match TextEmbedding::try_new(options) {
            Ok(model) => Some(RwLock::new(model)),
            Err(err) => {
                tracing::warn!(error = %err, "embedding backend unavailable, degrading to keyword search");
                None
            }
        };
        Self {
            model,
            cache: RwLock::new(EmbeddingCache::new()),
        }
    }

    /// True when no embedding backend is loaded and the Memory Store
    /// must fall back to substring/keyword matching.
    pub fn is_degraded(&self) -> bool {
        self.model.is_none()
    }

    /// Embed a single piece of text, using the cache when possible.
    /// Returns `None` when degraded.
    pub fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        let model = self.model.as_ref()?;
        let key = xxh3_64(text.as_bytes());
        if let Some(cached) = self.cache.write().ok()?.get(key) {
            return Some(cached);
        }
        let mut guard = model.write().ok()?;
        let mut embeddings = guard.embed(vec![text.to_string()], None).ok()?;
        let vector = embeddings.pop()?;
        self.cache.write().ok()?.insert(key, vector.clone());
        Some(vector)
    }

    /// Embed a batch of texts in one backend call. Returns `None` when
    /// degraded; any single embed failure degrades that whole batch call
    /// (callers should fall back to keyword matching for the batch).
    pub fn embed_batch(&self, texts: &[String]) -> Option<Vec<Vec<f32>>> {
        let model = self.model.as_ref()?;
        let mut guard = model.write().ok()?;
        guard.embed(texts.to_vec(), None).ok()
    }

    /// Cosine similarity between two embedding vectors, in `[-1.0, 1.0]`.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.is_empty() || b.is_empty() || a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
        }
    }
}

/// Degraded-mode keyword score: fraction of query tokens present in the
/// candidate text, case-insensitive. Used when [`EmbeddingOracle`] has no
/// backend.
pub fn keyword_score(query: &str, candidate: &str) -> f32 {
    let candidate_lower = candidate.to_lowercase();
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let matched = tokens
        .iter()
        .filter(|t| candidate_lower.contains(&t.to_lowercase()))
        .count();
    matched as f32 / tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((EmbeddingOracle::cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn keyword_score_matches_overlapping_tokens() {
        let score = keyword_score("hardcoded api key", "found a hardcoded API key in source");
        assert!(score > 0.5);
    }

    #[test]
    fn keyword_score_is_zero_for_empty_query() {
        assert_eq!(keyword_score("", "anything"), 0.0);
    }
}
