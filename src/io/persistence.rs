//! Persisted state (spec §6 "Persisted state layout"): everything under
//! the engine's data directory that isn't a language store or the
//! cross-reference index (those are owned by [`crate::memory`]).
//!
//! `runs/<run_id>/issues.json` holds one run's Issue list; `runs/<run_id>/backup/`
//! is populated by the Automated Patcher when a run actually mutates the
//! project; `metrics/history.json` is an append-only log of run summaries
//! consumed by the `stats`/`metrics` CLI commands.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::issue::Issue;
use crate::core::errors::{Result, VigilError};

/// One row of `metrics/history.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Matches the `runs/<run_id>` directory this summary was written for.
    pub run_id: String,
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
    /// CLI command that produced this run (`analyze`, `fix`, `cycle`, ...).
    pub command: String,
    /// Issue counts by severity name, from the final pass.
    pub issues_by_severity: std::collections::HashMap<String, usize>,
    /// Fix Proposals accepted and committed.
    pub fixes_applied: usize,
    /// Fix Proposals explicitly rejected during approval.
    pub fixes_rejected: usize,
    /// Rollbacks performed (Patcher or recursive-regression rollback).
    pub rollbacks_performed: usize,
    /// Recursive-improvement passes actually executed.
    pub passes_run: u32,
    /// Whether this run ended in `RegressionDetected`.
    pub regression_detected: bool,
}

/// Owns `runs/` and `metrics/` under the engine's data directory.
pub struct PersistenceStore {
    data_dir: PathBuf,
}

impl PersistenceStore {
    /// Build a store rooted at `data_dir` (the engine's configured data
    /// directory; tests use a temp dir).
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Create a fresh `runs/<run_id>/` directory named by the current
    /// timestamp, and return its id alongside the directory path.
    pub fn begin_run(&self) -> Result<(String, PathBuf)> {
        let run_id = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let dir = self.data_dir.join("runs").join(&run_id);
        fs::create_dir_all(&dir)?;
        Ok((run_id, dir))
    }

    /// Write `issues.json` into an already-created run directory.
    pub fn write_issues(&self, run_dir: &Path, issues: &[Issue]) -> Result<PathBuf> {
        let path = run_dir.join("issues.json");
        let json = serde_json::to_vec_pretty(issues).map_err(VigilError::from)?;
        atomic_write(&path, &json)?;
        Ok(path)
    }

    /// The backup subdirectory for a run directory. Created by whichever
    /// caller actually performs a mutation (the Automated Patcher), not
    /// eagerly here.
    pub fn backup_dir(&self, run_dir: &Path) -> PathBuf {
        run_dir.join("backup")
    }

    /// Append one summary row to `metrics/history.json`, read-modify-
    /// write via the same atomic-rename discipline the Memory Store
    /// uses, so a crash mid-write never corrupts prior history.
    pub fn append_run_summary(&self, summary: &RunSummary) -> Result<()> {
        let path = self.history_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut history = self.read_history_at(&path)?;
        history.push(summary.clone());
        let json = serde_json::to_vec_pretty(&history).map_err(VigilError::from)?;
        atomic_write(&path, &json)
    }

    /// Read the full run-summary history, empty if no run has completed
    /// yet.
    pub fn read_history(&self) -> Result<Vec<RunSummary>> {
        self.read_history_at(&self.history_path())
    }

    fn history_path(&self) -> PathBuf {
        self.data_dir.join("metrics").join("history.json")
    }

    fn read_history_at(&self, path: &Path) -> Result<Vec<RunSummary>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VigilError::corrupt_store("metrics", e.to_string()))
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::issue::Severity;
    use tempfile::tempdir;

    fn issue() -> Issue {
        Issue {
            issue_type: "unused_import".into(),
            file_path: "a.py".into(),
            line: 1,
            column: None,
            severity: Severity::Low,
            description: String::new(),
            educational_content: String::new(),
            suggestion: None,
            similar_patterns: Vec::new(),
            context_tags: Vec::new(),
        }
    }

    fn summary(run_id: &str) -> RunSummary {
        RunSummary {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            command: "analyze".to_string(),
            issues_by_severity: std::collections::HashMap::new(),
            fixes_applied: 0,
            fixes_rejected: 0,
            rollbacks_performed: 0,
            passes_run: 1,
            regression_detected: false,
        }
    }

    #[test]
    fn begin_run_creates_a_fresh_directory_each_time() {
        let dir = tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        let (id_a, dir_a) = store.begin_run().unwrap();
        assert!(dir_a.exists());
        assert!(dir_a.ends_with(&id_a));
    }

    #[test]
    fn write_issues_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        let (_, run_dir) = store.begin_run().unwrap();
        let path = store.write_issues(&run_dir, &[issue()]).unwrap();
        let bytes = fs::read(path).unwrap();
        let loaded: Vec<Issue> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].issue_type, "unused_import");
    }

    #[test]
    fn run_summaries_accumulate_across_appends() {
        let dir = tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.append_run_summary(&summary("run-a")).unwrap();
        store.append_run_summary(&summary("run-b")).unwrap();
        let history = store.read_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].run_id, "run-b");
    }

    #[test]
    fn read_history_on_a_fresh_data_dir_is_empty() {
        let dir = tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        assert!(store.read_history().unwrap().is_empty());
    }
}
