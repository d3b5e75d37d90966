//! The Safety Envelope (C13): project-boundary enforcement wrapping every
//! externally-visible operation, plus the limits and field-shaping it
//! composes.

use std::path::{Path, PathBuf};

use crate::core::config::SafetyConfig;
use crate::core::errors::{Result, VigilError};
use crate::core::safety::field_shaping::{self, ResonanceCounters, ResonanceSnapshot, SensitiveOp, Verdict};
use crate::core::safety::limits::{LimitTracker, OperationGuard, RecursionGuard};

/// Wraps every analyzer/patcher/connector/mapper file access and every
/// recursive-improvement pass.
pub struct SafetyEnvelope {
    project_root: PathBuf,
    limits: LimitTracker,
    resonance: ResonanceCounters,
}

impl SafetyEnvelope {
    /// Build an envelope scoped to `project_root`.
    pub fn new(project_root: impl Into<PathBuf>, config: &SafetyConfig) -> Result<Self> {
        let project_root = project_root.into();
        let project_root = project_root
            .canonicalize()
            .map_err(|_| VigilError::not_found(project_root.display().to_string()))?;
        Ok(Self {
            project_root,
            limits: LimitTracker::new(config),
            resonance: ResonanceCounters::default(),
        })
    }

    /// The canonical project root this envelope enforces.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve `path` and verify it stays under the project root.
    /// `path` may be relative (resolved against the root) or absolute.
    /// A `backup_dir`/`temp_dir` is explicitly tracked but exempted via
    /// [`SafetyEnvelope::verify_outside_project`] instead of this method.
    pub fn resolve_in_project(&self, path: &Path) -> Result<PathBuf> {
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        let normalized = normalize(&candidate);
        if !normalized.starts_with(&self.project_root) {
            return Err(VigilError::boundary_violation(
                path.display().to_string(),
                self.project_root.display().to_string(),
            ));
        }
        Ok(normalized)
    }

    /// Verify a backup/temp directory is NOT inside the project root, as
    /// the Automated Patcher requires before writing a backup.
    pub fn verify_outside_project(&self, path: &Path) -> Result<PathBuf> {
        let normalized = normalize(path);
        if normalized.starts_with(&self.project_root) {
            return Err(VigilError::UnsafeBackupLocation {
                backup_dir: path.display().to_string(),
                project_root: self.project_root.display().to_string(),
            });
        }
        Ok(normalized)
    }

    /// Enter one recursion level (recursive-improvement pass).
    pub fn enter_recursion(&self) -> Result<RecursionGuard<'_>> {
        self.limits.enter_recursion()
    }

    /// Enter one outward operation slot with a deadline.
    pub fn enter_operation(&self) -> Result<OperationGuard<'_>> {
        self.limits.enter_operation()
    }

    /// Cooperative checkpoint for the emergency stop.
    pub fn checkpoint(&self) -> Result<()> {
        self.limits.checkpoint()
    }

    /// Engage the emergency stop immediately.
    pub fn trigger_emergency_stop(&self) {
        self.limits.trigger_emergency_stop();
    }

    /// Evaluate a sensitive operation's field-shaping verdict. A
    /// [`Verdict::Deny`] must be treated as authoritative by the caller;
    /// every other verdict still permits the operation to proceed.
    pub fn evaluate_intention(&self, op: SensitiveOp, rationale: &str) -> Verdict {
        field_shaping::evaluate(&self.resonance, op, rationale)
    }

    /// Read-only resonance counter snapshot for `stats`/`metrics`.
    pub fn resonance_snapshot(&self) -> ResonanceSnapshot {
        self.resonance.snapshot()
    }

    /// Deny an attempt by the engine to modify its own installed binary
    /// or source tree. Called by the Automated Patcher before accepting
    /// any file-copy/modification step whose target resolves to the
    /// engine's own executable path.
    pub fn deny_self_modification(&self, target: &Path) -> Result<()> {
        let verdict = self.evaluate_intention(SensitiveOp::SelfModification, "patch own binary");
        if verdict == Verdict::Deny {
            return Err(VigilError::boundary_violation(
                target.display().to_string(),
                self.project_root.display().to_string(),
            ));
        }
        Ok(())
    }
}

/// Lexically normalize a path (resolve `.`/`..` components) without
/// requiring the path to exist, unlike `Path::canonicalize`.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dot_dot_path_is_rejected() {
        let dir = tempdir().unwrap();
        let envelope = SafetyEnvelope::new(dir.path(), &SafetyConfig::default()).unwrap();
        let escaping = Path::new("../../etc/passwd");
        assert!(matches!(
            envelope.resolve_in_project(escaping),
            Err(VigilError::BoundaryViolation { .. })
        ));
    }

    #[test]
    fn path_inside_root_resolves() {
        let dir = tempdir().unwrap();
        let envelope = SafetyEnvelope::new(dir.path(), &SafetyConfig::default()).unwrap();
        let resolved = envelope.resolve_in_project(Path::new("src/lib.rs")).unwrap();
        assert!(resolved.starts_with(envelope.project_root()));
    }

    #[test]
    fn backup_dir_inside_project_is_rejected() {
        let dir = tempdir().unwrap();
        let envelope = SafetyEnvelope::new(dir.path(), &SafetyConfig::default()).unwrap();
        let inside = dir.path().join("backup");
        assert!(envelope.verify_outside_project(&inside).is_err());
    }
}
