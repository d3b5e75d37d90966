//! On-disk persisted state: run histories and metrics, per spec §6's
//! "Persisted state layout". Language pattern stores and the
//! cross-reference index live under the same data directory but are
//! owned by [`crate::memory`], not this module.

pub mod persistence;

pub use persistence::{PersistenceStore, RunSummary};
