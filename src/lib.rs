//! # vigil: a persistent, learning static-analysis engine
//!
//! `vigil_core` ingests polyglot source trees, detects issues per-language,
//! proposes and gates fixes behind a three-stage Defense-in-Depth
//! Validator, and accumulates cross-session knowledge in a durable,
//! language-isolated Memory Store. It also maps and applies third-party
//! update packages into an existing project under the same safety
//! machinery.
//!
//! ## Components
//!
//! - [`memory`] — the Memory Store and Embedding Oracle (pattern recall,
//!   cross-language correlation).
//! - [`walker`] — the File Walker (git-aware enumeration, batching).
//! - [`analysis`] — per-language analyzers, their registry, the
//!   False-Positive Filter, and the Orchestrator that drives a run.
//! - [`lang`] — tree-sitter backed AST adapters shared by the analyzers,
//!   the Code Connector, and the Package Analyzer.
//! - [`fixes`] — the Fix Generator, interactive Approval Session, and
//!   the Defense-in-Depth Validator.
//! - [`integration`] — the Code Connector, Package Analyzer, Integration
//!   Mapper, and Automated Patcher for update-package integration.
//! - [`core::safety`] — the process-wide Safety Envelope: project
//!   boundary enforcement, resource limits, the emergency stop, and
//!   observability-only field-shaping guidance.
//! - [`io`] — persisted run history and metrics, outside the per-language
//!   stores.
//!
//! The CLI binary (`src/bin/vigil.rs`) is a thin `clap` front end over
//! this library; every operation it performs is also reachable
//! programmatically through the types re-exported here.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::fn_params_excessive_bools)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
// Additional allows for tests and examples
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

// Memory allocator selection (mutually exclusive)
#[cfg(all(feature = "mimalloc", not(feature = "jemalloc")))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(all(feature = "jemalloc", not(feature = "mimalloc")))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

// Core: configuration, errors, and the Safety Envelope.
pub mod core {
    //! Engine-wide configuration, error types, and the Safety Envelope.

    pub mod config;
    pub mod errors;
    pub mod safety;
}

// Language-specific AST adapters shared by analysis, the Code Connector,
// and the Package Analyzer.
pub mod lang {
    //! Language-specific parsing and AST extraction.

    pub mod common;
    pub mod cpp;
    pub mod go;
    pub mod javascript;
    pub mod python;
    pub mod registry;
    pub mod rust_lang;
    pub mod typescript;

    pub use common::{EntityKind, LanguageAdapter, ParseIndex, ParsedEntity, SourceLocation};
    pub use registry::{adapter_for_file, adapter_for_language, language_key_for_path, SUPPORTED_LANGUAGES};
}

pub mod analysis;
pub mod fixes;
pub mod integration;
pub mod io;
pub mod memory;
pub mod walker;

// Re-export the types most callers (and the CLI) reach for first.
pub use core::errors::{Result, ResultExt, VigilError};
pub use core::config::EngineConfig;

/// Library version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
