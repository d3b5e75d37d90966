//! Analyzer Orchestrator (C5): drives the File Walker, dispatches each
//! batch's files to analyzers in parallel, filters and persists Issues,
//! and runs recursive-improvement passes with a non-regression guard.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::false_positive::FalsePositiveFilter;
use crate::analysis::issue::Issue;
use crate::analysis::registry::AnalyzerRegistry;
use crate::core::config::OrchestratorConfig;
use crate::core::errors::{Result, VigilError};
use crate::core::safety::SafetyEnvelope;
use crate::memory::MemoryStore;
use crate::walker::{FileWalker, Scope};

/// Per-batch throughput and finding counters, emitted after each batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetrics {
    /// Files analyzed in this batch.
    pub files_analyzed: usize,
    /// Wall-clock seconds the batch took.
    pub seconds: f64,
    /// Issues found, by severity name.
    pub issues_by_severity: std::collections::HashMap<String, usize>,
    /// New patterns learned this batch.
    pub patterns_learned: usize,
}

/// Aggregate result of one orchestrator run (one or more recursive
/// passes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// All surviving Issues across every pass, from the final pass only.
    pub issues: Vec<Issue>,
    /// Per-batch metrics in execution order.
    pub batch_metrics: Vec<BatchMetrics>,
    /// Number of recursive passes actually executed.
    pub passes_run: u32,
}

/// Drives a full analysis run.
pub struct Orchestrator<'a> {
    envelope: &'a SafetyEnvelope,
    memory: &'a MemoryStore,
    registry: AnalyzerRegistry,
    config: OrchestratorConfig,
}

impl<'a> Orchestrator<'a> {
    /// Build an orchestrator over `envelope`'s project and `memory`'s
    /// stores.
    pub fn new(envelope: &'a SafetyEnvelope, memory: &'a MemoryStore, config: OrchestratorConfig) -> Self {
        Self {
            envelope,
            memory,
            registry: AnalyzerRegistry::new(),
            config,
        }
    }

    /// Run one analysis pass over `scope`, batched via the File Walker.
    pub fn run_pass(&self, scope: &Scope, batch_size: usize) -> Result<(Vec<Issue>, Vec<BatchMetrics>)> {
        self.envelope.checkpoint()?;
        let walker_config = crate::core::config::WalkerConfig { batch_size };
        let walker = FileWalker::new(self.envelope, walker_config);
        let batches = walker.discover(scope)?;

        let mut all_issues = Vec::new();
        let mut metrics = Vec::new();

        for batch in batches {
            self.envelope.checkpoint()?;
            let _guard = self.envelope.enter_operation()?;
            let started = Instant::now();

            let results: Vec<Result<Vec<Issue>>> = batch
                .files
                .par_iter()
                .map(|path| self.analyze_one(path))
                .collect();

            let mut batch_issues = Vec::new();
            for result in results {
                match result {
                    Ok(issues) => batch_issues.extend(issues),
                    Err(err) => tracing::warn!(%err, "file analysis failed"),
                }
            }

            let mut by_severity = std::collections::HashMap::new();
            for issue in &batch_issues {
                *by_severity.entry(format!("{:?}", issue.severity).to_lowercase()).or_insert(0) += 1;
            }

            metrics.push(BatchMetrics {
                files_analyzed: batch.files.len(),
                seconds: started.elapsed().as_secs_f64(),
                issues_by_severity: by_severity,
                patterns_learned: batch_issues.len(),
            });

            all_issues.extend(batch_issues);
        }

        Ok((all_issues, metrics))
    }

    fn analyze_one(&self, path: &PathBuf) -> Result<Vec<Issue>> {
        let resolved = self.envelope.resolve_in_project(path).unwrap_or_else(|_| path.clone());
        let content = fs::read_to_string(&resolved)?;
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let analyzer = self.registry.analyzer_for_file(&resolved)?;
        let handle = self.memory.open(analyzer.language_name())?;

        let issues = analyzer.analyze_file(&resolved.display().to_string(), &content, &handle)?;
        let filtered = FalsePositiveFilter::filter(&handle, issues, &lines);
        analyzer.learn_from_analysis(&filtered, &handle)?;
        Ok(filtered)
    }

    /// Run recursive-improvement passes up to `max_depth` (capped at the
    /// config's hard cap), re-running the same scope after each pass
    /// under the assumption external callers (the Patcher) have applied
    /// fixes between passes. Aborts with `RegressionDetected` if any
    /// pass's critical+high count increases over the previous pass.
    pub fn run_recursive(&self, scope: &Scope, batch_size: usize, max_depth: u32) -> Result<RunResult> {
        let depth = max_depth.min(self.config.max_depth_hard_cap);
        let mut all_metrics = Vec::new();
        let mut previous_high_severity: Option<usize> = None;
        let mut issues = Vec::new();
        let mut passes_run = 0;

        for pass in 0..=depth {
            let _recursion_guard = self.envelope.enter_recursion()?;
            let (pass_issues, pass_metrics) = self.run_pass(scope, batch_size)?;
            let high_severity_count = pass_issues.iter().filter(|i| i.counts_toward_regression()).count();

            if let Some(before) = previous_high_severity {
                if high_severity_count > before {
                    return Err(VigilError::RegressionDetected {
                        depth: pass,
                        before,
                        after: high_severity_count,
                    });
                }
            }

            previous_high_severity = Some(high_severity_count);
            all_metrics.extend(pass_metrics);
            passes_run = pass + 1;
            issues = pass_issues;

            if issues.is_empty() {
                break;
            }
        }

        self.memory.reconcile_cross_reference();

        Ok(RunResult {
            issues,
            batch_metrics: all_metrics,
            passes_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SafetyConfig;
    use crate::memory::EmbeddingOracle;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn memory_store() -> MemoryStore {
        let dir = tempdir().unwrap();
        MemoryStore::new(dir.into_path(), Arc::new(EmbeddingOracle::new(None)), Duration::from_secs(2))
    }

    #[test]
    fn run_pass_finds_issues_in_a_project() {
        let project = tempdir().unwrap();
        fs::write(project.path().join("a.py"), "api_key = \"sk-abcdefghijklmnop\"\n").unwrap();
        let envelope = SafetyEnvelope::new(project.path(), &SafetyConfig::default()).unwrap();
        let memory = memory_store();
        let orchestrator = Orchestrator::new(&envelope, &memory, OrchestratorConfig::default());

        let (issues, metrics) = orchestrator.run_pass(&Scope::FullTree, 50).unwrap();
        assert!(issues.iter().any(|i| i.issue_type == "hardcoded_api_key"));
        assert_eq!(metrics.len(), 1);
    }

    #[test]
    fn recursive_run_stops_when_issues_resolved() {
        let project = tempdir().unwrap();
        fs::write(project.path().join("clean.py"), "x = 1\n").unwrap();
        let envelope = SafetyEnvelope::new(project.path(), &SafetyConfig::default()).unwrap();
        let memory = memory_store();
        let orchestrator = Orchestrator::new(&envelope, &memory, OrchestratorConfig::default());

        let result = orchestrator.run_recursive(&Scope::FullTree, 50, 3).unwrap();
        assert!(result.issues.is_empty());
        assert_eq!(result.passes_run, 1);
    }
}
