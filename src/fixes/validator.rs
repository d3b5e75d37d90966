//! Defense-in-Depth Validator (C12): three independent veto gates a Fix
//! Proposal must clear, in order, before the Automated Patcher is allowed
//! to apply it. Any one gate failing stops the application; gates never
//! compensate for each other.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::config::FixConfig;
use crate::core::errors::{Result, VigilError};
use crate::fixes::generator::{apply_line_range, FixProposal};
use crate::lang::registry;

/// Regexes matching the dangerous-pattern signatures spec §4.10 names:
/// dynamic code execution, unsafe deserialization, credential
/// exfiltration, and self-replication. Any one matching the proposal's
/// `replacement_snippet` (or the file it would produce) is an automatic
/// veto, independent of the proposal's claimed `safety_score`.
static DANGEROUS_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("dynamic_code_execution", Regex::new(r"\b(eval|exec|compile)\s*\(").unwrap()),
        ("shell_true_subprocess", Regex::new(r"shell\s*=\s*True").unwrap()),
        ("os_system_call", Regex::new(r"os\.system\s*\(").unwrap()),
        ("unsafe_deserialization", Regex::new(r"pickle\.loads?\s*\(|yaml\.load\s*\([^)]*\)\s*$").unwrap()),
        (
            "credential_exfiltration",
            Regex::new(r#"(requests\.(post|get)|urlopen|fetch)\([^)]*\b(api_key|secret|password|token)\b"#).unwrap(),
        ),
        (
            "self_replication",
            Regex::new(r"shutil\.copy(file|tree)?\s*\([^)]*__file__|open\s*\(\s*(__file__|sys\.argv\[0\])").unwrap(),
        ),
    ]
});

/// Scan arbitrary candidate text for a dangerous-pattern signature.
/// Shared by the Fix Proposal pattern gate and the Automated Patcher's
/// post-step validation of Integration Map modifications, which carry
/// free-form `new_content` rather than a `FixProposal`.
pub fn scan_dangerous_patterns(text: &str) -> Result<()> {
    for (name, pattern) in DANGEROUS_PATTERNS.iter() {
        if pattern.is_match(text) {
            return Err(VigilError::dangerous_pattern(*name));
        }
    }
    Ok(())
}

/// Outcome of running a Fix Proposal through all three gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    /// Pattern gate passed.
    pub pattern_gate: bool,
    /// Metadata gate passed.
    pub metadata_gate: bool,
    /// Sandbox gate passed (or was intentionally skipped).
    pub sandbox_gate: bool,
    /// True if the sandbox gate was skipped per
    /// `FixConfig::skip_sandbox_for_auto_safe`. Still a pass for
    /// `sandbox_gate`, but recorded separately for audit.
    pub sandbox_skipped: bool,
}

/// Runs the pattern, metadata, and sandbox gates against a Fix Proposal.
pub struct DefenseInDepthValidator<'a> {
    config: &'a FixConfig,
}

impl<'a> DefenseInDepthValidator<'a> {
    /// Build a validator bound to the engine's fix configuration.
    pub fn new(config: &'a FixConfig) -> Self {
        Self { config }
    }

    /// Run all three gates against `proposal`. `project_root` is the
    /// real project tree the sandbox gate will clone from; it is never
    /// itself modified.
    pub fn validate(&self, proposal: &FixProposal, project_root: &Path) -> Result<GateReport> {
        self.pattern_gate(proposal)?;
        self.metadata_gate(proposal)?;

        let sandbox_skipped = proposal.auto_safe && self.config.skip_sandbox_for_auto_safe;
        if !sandbox_skipped {
            self.sandbox_gate(proposal, project_root)?;
        }

        Ok(GateReport {
            pattern_gate: true,
            metadata_gate: true,
            sandbox_gate: true,
            sandbox_skipped,
        })
    }

    fn pattern_gate(&self, proposal: &FixProposal) -> Result<()> {
        scan_dangerous_patterns(&proposal.replacement_snippet)
    }

    fn metadata_gate(&self, proposal: &FixProposal) -> Result<()> {
        if !(0.0..=1.0).contains(&proposal.safety_score) {
            return Err(VigilError::metadata_tampering(format!(
                "safety_score {} outside [0, 1]",
                proposal.safety_score
            )));
        }
        let (start, end) = proposal.line_range;
        if start == 0 || start > end {
            return Err(VigilError::metadata_tampering(format!(
                "invalid line_range ({start}, {end})"
            )));
        }
        if proposal.issue.line < start || proposal.issue.line > end {
            return Err(VigilError::metadata_tampering(format!(
                "issue line {} falls outside proposal line_range ({start}, {end})",
                proposal.issue.line
            )));
        }
        if proposal.auto_safe {
            if proposal.safety_score < self.config.auto_safe_threshold {
                return Err(VigilError::metadata_tampering(format!(
                    "auto_safe set but safety_score {} below threshold {}",
                    proposal.safety_score, self.config.auto_safe_threshold
                )));
            }
            if !self
                .config
                .auto_safe_categories
                .iter()
                .any(|c| c == &proposal.template_id)
            {
                return Err(VigilError::metadata_tampering(format!(
                    "auto_safe set but template '{}' is not in auto_safe_categories",
                    proposal.template_id
                )));
            }
        }
        Ok(())
    }

    fn sandbox_gate(&self, proposal: &FixProposal, project_root: &Path) -> Result<()> {
        let sandbox_dir = tempfile::tempdir().map_err(VigilError::from)?;
        copy_project_tree(project_root, sandbox_dir.path())?;

        let target = sandbox_dir.path().join(&proposal.target_file);
        let original = std::fs::read_to_string(&target)
            .map_err(|e| VigilError::sandbox_validation_failed(format!("reading {}: {e}", proposal.target_file)))?;
        let patched = apply_line_range(&original, proposal.line_range, &proposal.replacement_snippet);
        std::fs::write(&target, &patched)
            .map_err(|e| VigilError::sandbox_validation_failed(format!("writing {}: {e}", proposal.target_file)))?;

        let mut adapter = registry::adapter_for_file(&target)?;
        let index = adapter
            .parse(&proposal.target_file, &patched)
            .map_err(|e| VigilError::sandbox_validation_failed(format!("parse check errored: {e}")))?;
        if let Some(message) = index.parse_error {
            return Err(VigilError::sandbox_validation_failed(format!(
                "patched file no longer parses: {message}"
            )));
        }

        if let Some(build_command) = &self.config.sandbox_build_command {
            run_with_timeout(
                build_command,
                sandbox_dir.path(),
                Duration::from_secs(self.config.sandbox_timeout_seconds),
            )?;
        }
        if let Some(smoke_command) = &self.config.sandbox_smoke_command {
            run_with_timeout(
                smoke_command,
                sandbox_dir.path(),
                Duration::from_secs(self.config.sandbox_timeout_seconds),
            )?;
        }
        Ok(())
    }
}

/// Copy a project tree into an isolated sandbox directory, skipping
/// version-control metadata. The tree itself carries no isolation;
/// network containment for anything run against it is `run_with_timeout`'s
/// job.
fn copy_project_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let relative = match entry.path().strip_prefix(src) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if relative
            .components()
            .any(|c| c.as_os_str() == ".git" || c.as_os_str() == "target")
        {
            continue;
        }
        let dest = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Run a shell command with a watchdog timeout. The command string is
/// split on whitespace into `program` + args; no shell is invoked, so
/// `build_command`/`smoke_command` values cannot themselves reintroduce
/// shell-interpolation risk.
///
/// The command is spawned inside a fresh network namespace via
/// `unshare --net`, so it has no route to any interface but loopback,
/// regardless of proxy env vars. If `unshare` itself can't be spawned
/// (missing on the host, or the kernel refuses `CLONE_NEWNET` in this
/// sandbox), the gate fails closed with `SandboxValidationFailed` rather
/// than silently running the command without isolation.
pub(crate) fn run_with_timeout(command: &str, cwd: &Path, timeout: Duration) -> Result<()> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| VigilError::sandbox_validation_failed("empty sandbox command"))?;
    let mut child = Command::new("unshare")
        .arg("--net")
        .arg("--map-root-user")
        .arg("--")
        .arg(program)
        .args(parts)
        .current_dir(cwd)
        .env_remove("http_proxy")
        .env_remove("https_proxy")
        .spawn()
        .map_err(|e| {
            VigilError::sandbox_validation_failed(format!(
                "spawning '{command}' under network-isolated 'unshare --net': {e}"
            ))
        })?;

    let start = Instant::now();
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| VigilError::sandbox_validation_failed(format!("waiting on '{command}': {e}")))?
        {
            return if status.success() {
                Ok(())
            } else {
                Err(VigilError::sandbox_validation_failed(format!(
                    "'{command}' exited with {status}"
                )))
            };
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            return Err(VigilError::sandbox_validation_failed(format!(
                "'{command}' timed out after {}s",
                timeout.as_secs()
            )));
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::issue::{Issue, Severity};
    use crate::fixes::generator::FixCategory;

    fn base_proposal() -> FixProposal {
        FixProposal {
            issue: Issue {
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
            },
            target_file: "a.py".into(),
            original_snippet: "import os".into(),
            replacement_snippet: String::new(),
            line_range: (1, 1),
            category: FixCategory::DeadCode,
            safety_score: 0.95,
            auto_safe: true,
            rationale: "unused".into(),
            rollback_blob: "import os".into(),
            template_id: "remove_unused_import".into(),
        }
    }

    #[test]
    fn pattern_gate_rejects_os_system_replacement() {
        let config = FixConfig::default();
        let validator = DefenseInDepthValidator::new(&config);
        let mut proposal = base_proposal();
        proposal.replacement_snippet = "os.system(user_input)".into();
        let err = validator.pattern_gate(&proposal).unwrap_err();
        assert!(matches!(err, VigilError::DangerousPattern { .. }));
    }

    #[test]
    fn metadata_gate_rejects_auto_safe_outside_allowlist() {
        let config = FixConfig::default();
        let validator = DefenseInDepthValidator::new(&config);
        let mut proposal = base_proposal();
        proposal.template_id = "disable_shell_true".into();
        let err = validator.metadata_gate(&proposal).unwrap_err();
        assert!(matches!(err, VigilError::MetadataTampering { .. }));
    }

    #[test]
    fn metadata_gate_rejects_issue_line_outside_range() {
        let config = FixConfig::default();
        let validator = DefenseInDepthValidator::new(&config);
        let mut proposal = base_proposal();
        proposal.issue.line = 5;
        let err = validator.metadata_gate(&proposal).unwrap_err();
        assert!(matches!(err, VigilError::MetadataTampering { .. }));
    }

    #[test]
    fn well_formed_auto_safe_proposal_clears_pattern_and_metadata_gates() {
        let config = FixConfig::default();
        let validator = DefenseInDepthValidator::new(&config);
        let proposal = base_proposal();
        assert!(validator.pattern_gate(&proposal).is_ok());
        assert!(validator.metadata_gate(&proposal).is_ok());
    }
}
