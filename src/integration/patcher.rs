//! Automated Patcher (C10): backs up, applies an Integration Map (or a
//! bundle of Fix Proposals — same machinery) atomically, validates each
//! step, and rolls back on any failure.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::FixConfig;
use crate::core::errors::{Result, VigilError};
use crate::core::safety::envelope::SafetyEnvelope;
use crate::fixes::validator::{run_with_timeout, scan_dangerous_patterns};
use crate::fixes::{ApprovalDecision, DefenseInDepthValidator, FixProposal};
use crate::integration::mapper::{FileModification, IntegrationMap, IntegrationStep, SafetyLevel};

/// What actually happened to one file during a patcher run, kept for
/// rollback and for the post-run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Project root the patcher operated on.
    pub project_root: PathBuf,
    /// Per-run backup directory, outside `project_root`.
    pub backup_dir: PathBuf,
    /// Files that existed before this run and were backed up, paired
    /// with their backup copy's path.
    pub backed_up: Vec<(String, PathBuf)>,
    /// Files newly created by this run (nothing to restore but deletion
    /// on rollback).
    pub newly_created: Vec<String>,
    /// Files actually committed by the end of the run.
    pub committed: Vec<String>,
}

/// RAII advisory lock: the Patcher is single-writer per project. The
/// lock file lives inside the backup directory and is removed on drop.
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(backup_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(backup_root)?;
        let path = backup_root.join(".vigil-patcher.lock");
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|_| VigilError::internal(format!("another patcher run holds the lock at {}", path.display())))?;
        Ok(Self { path })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Applies an Integration Map or a Fix Proposal bundle, atomically with
/// respect to the project tree: either every step commits or every
/// change so far is rolled back.
pub struct AutomatedPatcher<'a> {
    envelope: &'a SafetyEnvelope,
    config: &'a FixConfig,
    /// When true, every non-`safe`/non-`auto_safe` step is confirmed
    /// interactively before being written.
    interactive: bool,
}

impl<'a> AutomatedPatcher<'a> {
    /// Build a patcher bound to the project's Safety Envelope and fix
    /// configuration.
    pub fn new(envelope: &'a SafetyEnvelope, config: &'a FixConfig, interactive: bool) -> Self {
        Self {
            envelope,
            config,
            interactive,
        }
    }

    /// Execute an Integration Map. `backup_dir` must resolve outside
    /// the project root; the Patcher itself verifies this via the
    /// Safety Envelope before writing anything.
    pub fn execute(&self, map: &IntegrationMap, backup_dir: &Path) -> Result<ExecutionContext> {
        let backup_root = self.envelope.verify_outside_project(backup_dir)?;
        let _lock = LockGuard::acquire(&backup_root)?;
        let run_dir = backup_root.join(run_id());
        std::fs::create_dir_all(&run_dir)?;

        let mut ctx = ExecutionContext {
            project_root: self.envelope.project_root().to_path_buf(),
            backup_dir: run_dir.clone(),
            backed_up: Vec::new(),
            newly_created: Vec::new(),
            committed: Vec::new(),
        };

        let outcome = self.execute_steps(map, &run_dir, &mut ctx);
        if let Err(err) = outcome {
            self.rollback(&ctx)?;
            return Err(err);
        }
        Ok(ctx)
    }

    fn execute_steps(&self, map: &IntegrationMap, run_dir: &Path, ctx: &mut ExecutionContext) -> Result<()> {
        for step in &map.steps {
            self.envelope.checkpoint()?;
            match step {
                IntegrationStep::DependencyInstall { validation_command, .. } => {
                    if let Some(command) = validation_command {
                        run_with_timeout(command, &ctx.project_root, self.timeout())?;
                    }
                }
                IntegrationStep::FileCopy { dest_path, content, safety_level, .. } => {
                    self.gate_interactively(*safety_level, &format!("copy new file to {dest_path}"))?;
                    scan_dangerous_patterns(content)?;
                    let target = self.resolve_target(dest_path)?;
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&target, content)?;
                    ctx.newly_created.push(dest_path.clone());
                    ctx.committed.push(dest_path.clone());
                }
                IntegrationStep::Modification(modification) => {
                    self.apply_modification(modification, run_dir, ctx)?;
                }
                IntegrationStep::Validation { touched_files, validation_command } => {
                    self.validate_touched_files(touched_files)?;
                    if let Some(command) = validation_command {
                        run_with_timeout(command, &ctx.project_root, self.timeout())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_modification(&self, modification: &FileModification, run_dir: &Path, ctx: &mut ExecutionContext) -> Result<()> {
        self.gate_interactively(modification.safety_level, &modification.reasoning)?;
        scan_dangerous_patterns(&modification.new_content)?;

        let target = self.resolve_target(&modification.target_file)?;
        self.envelope.deny_self_modification(&target)?;

        if target.exists() {
            let backup_path = backup_path_for(run_dir, &target);
            if let Some(parent) = backup_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&target, &backup_path)?;
            ctx.backed_up.push((modification.target_file.clone(), backup_path));
        } else {
            ctx.newly_created.push(modification.target_file.clone());
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &modification.new_content)?;
        ctx.committed.push(modification.target_file.clone());
        Ok(())
    }

    fn validate_touched_files(&self, touched_files: &[String]) -> Result<()> {
        for file in touched_files {
            let path = self.resolve_target(file)?;
            if !path.exists() {
                continue;
            }
            let Some(language) = crate::lang::registry::language_key_for_path(&path) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            let mut adapter = crate::lang::registry::adapter_for_language(language)?;
            let index = adapter.parse(file, &content)?;
            if let Some(message) = index.parse_error {
                return Err(VigilError::validation_failed(format!("{file} no longer parses: {message}")));
            }
        }
        Ok(())
    }

    /// Apply a bundle of accepted Fix Proposals, reusing the same
    /// backup/commit/rollback/lock machinery as `execute`, plus a full
    /// Defense-in-Depth pass (pattern, metadata, sandbox) per proposal
    /// immediately before it's written.
    pub fn apply_fixes(
        &self,
        decisions: &[(FixProposal, ApprovalDecision)],
        backup_dir: &Path,
        validator: &DefenseInDepthValidator<'_>,
    ) -> Result<ExecutionContext> {
        let backup_root = self.envelope.verify_outside_project(backup_dir)?;
        let _lock = LockGuard::acquire(&backup_root)?;
        let run_dir = backup_root.join(run_id());
        std::fs::create_dir_all(&run_dir)?;

        let mut ctx = ExecutionContext {
            project_root: self.envelope.project_root().to_path_buf(),
            backup_dir: run_dir.clone(),
            backed_up: Vec::new(),
            newly_created: Vec::new(),
            committed: Vec::new(),
        };

        let outcome = self.apply_fix_proposals(decisions, &run_dir, validator, &mut ctx);
        if let Err(err) = outcome {
            self.rollback(&ctx)?;
            return Err(err);
        }
        Ok(ctx)
    }

    fn apply_fix_proposals(
        &self,
        decisions: &[(FixProposal, ApprovalDecision)],
        run_dir: &Path,
        validator: &DefenseInDepthValidator<'_>,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        for (proposal, decision) in decisions {
            if *decision != ApprovalDecision::Accept {
                continue;
            }
            self.envelope.checkpoint()?;
            validator.validate(proposal, &ctx.project_root)?;

            let target = self.resolve_target(&proposal.target_file)?;
            self.envelope.deny_self_modification(&target)?;
            let original = std::fs::read_to_string(&target)?;
            let patched = crate::fixes::apply_line_range(&original, proposal.line_range, &proposal.replacement_snippet);

            let backup_path = backup_path_for(run_dir, &target);
            if let Some(parent) = backup_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&target, &backup_path)?;
            ctx.backed_up.push((proposal.target_file.clone(), backup_path));

            std::fs::write(&target, &patched)?;
            ctx.committed.push(proposal.target_file.clone());
        }
        Ok(())
    }

    /// Undo everything recorded in `ctx`: restore backed-up files,
    /// delete newly created ones. Continues past individual failures
    /// and reports them together rather than stopping partway.
    fn rollback(&self, ctx: &ExecutionContext) -> Result<()> {
        let mut failed = Vec::new();
        for (original_path, backup_path) in &ctx.backed_up {
            let Ok(target) = self.resolve_target(original_path) else {
                failed.push(original_path.clone());
                continue;
            };
            if let Some(parent) = target.parent() {
                if std::fs::create_dir_all(parent).is_err() {
                    failed.push(original_path.clone());
                    continue;
                }
            }
            if std::fs::copy(backup_path, &target).is_err() {
                failed.push(original_path.clone());
            }
        }
        for new_path in &ctx.newly_created {
            if let Ok(target) = self.resolve_target(new_path) {
                let _ = std::fs::remove_file(target);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(VigilError::partial_rollback(failed))
        }
    }

    fn resolve_target(&self, path: &str) -> Result<PathBuf> {
        self.envelope.resolve_in_project(Path::new(path))
    }

    fn gate_interactively(&self, safety_level: SafetyLevel, description: &str) -> Result<()> {
        if !self.interactive || safety_level == SafetyLevel::Safe {
            return Ok(());
        }
        let proceed = dialoguer::Confirm::new()
            .with_prompt(format!("Apply {safety_level:?} step: {description}?"))
            .default(false)
            .interact()
            .unwrap_or(false);
        if proceed {
            Ok(())
        } else {
            Err(VigilError::internal(format!("step declined by operator: {description}")))
        }
    }

    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.sandbox_timeout_seconds)
    }
}

fn backup_path_for(run_dir: &Path, target: &Path) -> PathBuf {
    let sanitized: String = target
        .to_string_lossy()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect();
    run_dir.join(sanitized)
}

fn run_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("run-{:06}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SafetyConfig;
    use crate::integration::mapper::ModificationType;

    fn envelope(dir: &Path) -> SafetyEnvelope {
        SafetyEnvelope::new(dir, &SafetyConfig::default()).unwrap()
    }

    #[test]
    fn file_copy_step_writes_the_new_file() {
        let project = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let env = envelope(project.path());
        let config = FixConfig::default();
        let patcher = AutomatedPatcher::new(&env, &config, false);

        let map = IntegrationMap {
            steps: vec![IntegrationStep::FileCopy {
                source_path: "helper.py".into(),
                dest_path: project.path().join("src/helper.py").to_string_lossy().to_string(),
                content: "def helper():\n    pass\n".into(),
                safety_level: SafetyLevel::Safe,
            }],
            total_estimated_time_seconds: 5,
            risk_assessment: crate::integration::mapper::RiskLevel::Low,
            rollback_plan: String::new(),
            validation_strategy: String::new(),
            success_criteria: Vec::new(),
        };

        let ctx = patcher.execute(&map, backups.path()).unwrap();
        assert_eq!(ctx.committed.len(), 1);
        assert!(project.path().join("src/helper.py").exists());
    }

    #[test]
    fn modification_step_backs_up_and_restores_on_rollback() {
        let project = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("main.py"), "print('before')\n").unwrap();
        let env = envelope(project.path());
        let config = FixConfig::default();
        let patcher = AutomatedPatcher::new(&env, &config, false);

        let target_file = project.path().join("main.py").to_string_lossy().to_string();
        let map = IntegrationMap {
            steps: vec![
                IntegrationStep::Modification(FileModification {
                    target_file: target_file.clone(),
                    modification_type: ModificationType::TextPatch,
                    line_number: None,
                    original_content: "print('before')\n".into(),
                    new_content: "print('after')\n".into(),
                    reasoning: "test".into(),
                    safety_level: SafetyLevel::Caution,
                    rollback_info: None,
                }),
                IntegrationStep::Validation {
                    touched_files: vec![target_file.clone()],
                    validation_command: Some("false".into()),
                },
            ],
            total_estimated_time_seconds: 5,
            risk_assessment: crate::integration::mapper::RiskLevel::Low,
            rollback_plan: String::new(),
            validation_strategy: String::new(),
            success_criteria: Vec::new(),
        };

        let result = patcher.execute(&map, backups.path());
        assert!(result.is_err());
        let restored = std::fs::read_to_string(project.path().join("main.py")).unwrap();
        assert_eq!(restored, "print('before')\n");
    }

    #[test]
    fn backup_dir_inside_project_is_rejected() {
        let project = tempfile::tempdir().unwrap();
        let env = envelope(project.path());
        let config = FixConfig::default();
        let patcher = AutomatedPatcher::new(&env, &config, false);
        let map = IntegrationMap {
            steps: Vec::new(),
            total_estimated_time_seconds: 0,
            risk_assessment: crate::integration::mapper::RiskLevel::Low,
            rollback_plan: String::new(),
            validation_strategy: String::new(),
            success_criteria: Vec::new(),
        };
        let inside = project.path().join("backups");
        assert!(patcher.execute(&map, &inside).is_err());
    }
}
