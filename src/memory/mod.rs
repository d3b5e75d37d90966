//! Memory Store subsystem (C1 + C2): persistent, per-language learned
//! patterns with hybrid semantic/keyword search and cross-language
//! correlation.

pub mod cross_reference;
pub mod embedding;
pub mod pattern;
pub mod store;

pub use cross_reference::{CrossRefEntry, CrossReferenceIndex};
pub use embedding::EmbeddingOracle;
pub use pattern::{PatternCategory, PatternRecord};
pub use store::{MemoryHandle, MemoryStore, Namespace, SearchHit, SearchResult};
