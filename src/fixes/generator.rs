//! Fix Generator (C11, generation half): a template library keyed by
//! [`Issue::issue_type`], producing [`FixProposal`]s whose `safety_score`
//! is nudged by the matching Pattern Record's historical success rate.

use serde::{Deserialize, Serialize};

use crate::analysis::issue::Issue;
use crate::core::config::FixConfig;
use crate::core::errors::{Result, VigilError};
use crate::fixes::validator::scan_dangerous_patterns;
use crate::memory::MemoryHandle;

/// Category of a Fix Proposal, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixCategory {
    /// Parse/syntax-level repairs.
    Syntax,
    /// Removing code that is never reached or referenced.
    DeadCode,
    /// Hardening against a security-relevant finding.
    Security,
    /// Performance-motivated rewrites.
    Performance,
    /// Anything else: renames, extractions, style.
    Refactor,
}

impl FixCategory {
    /// The config-file spelling used in `FixConfig::auto_safe_categories`
    /// and the `intelligent_fix_generator` namespace, distinct from the
    /// template id (several templates can share a category).
    pub fn as_str(self) -> &'static str {
        match self {
            FixCategory::Syntax => "syntax",
            FixCategory::DeadCode => "dead_code",
            FixCategory::Security => "security",
            FixCategory::Performance => "performance",
            FixCategory::Refactor => "refactor",
        }
    }
}

/// A candidate modification resolving an [`Issue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixProposal {
    /// The Issue this proposal resolves.
    pub issue: Issue,
    /// File the modification applies to.
    pub target_file: String,
    /// Exact text being replaced.
    pub original_snippet: String,
    /// Replacement text. Empty string deletes `line_range` entirely.
    pub replacement_snippet: String,
    /// 1-based, inclusive `(start, end)` line range being replaced.
    pub line_range: (usize, usize),
    /// Fix category.
    pub category: FixCategory,
    /// Confidence in `[0, 1]` that this fix is safe to apply unattended.
    pub safety_score: f64,
    /// Whether this proposal qualifies for auto-apply without interactive
    /// approval. Invariant: `auto_safe ⇒ safety_score ≥ auto_safe_threshold
    /// ∧ category` (by template id) `∈ auto_safe_categories`.
    pub auto_safe: bool,
    /// Human-readable justification shown in the approval UI.
    pub rationale: String,
    /// Exact bytes to splice back into `line_range` on rollback.
    pub rollback_blob: String,
    /// Id of the template that produced this proposal, used as the
    /// learning key in the `intelligent_fix_generator` namespace.
    pub template_id: String,
}

impl FixProposal {
    /// A unified-diff-flavored preview line for the approval UI: not a
    /// full diff, but enough to show what changes without rendering the
    /// whole file.
    pub fn preview(&self) -> String {
        let mut out = String::new();
        for line in self.original_snippet.lines() {
            out.push_str("- ");
            out.push_str(line);
            out.push('\n');
        }
        for line in self.replacement_snippet.lines() {
            out.push_str("+ ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

struct TemplateOutput {
    replacement: String,
    rationale: String,
}

struct FixTemplate {
    id: &'static str,
    issue_type: &'static str,
    category: FixCategory,
    base_safety_score: f64,
    build: fn(&Issue, &str) -> Option<TemplateOutput>,
}

fn templates() -> &'static [FixTemplate] {
    static TEMPLATES: &[FixTemplate] = &[
        FixTemplate {
            id: "remove_unused_import",
            issue_type: "unused_import",
            category: FixCategory::DeadCode,
            base_safety_score: 0.95,
            build: |_issue, _line| {
                Some(TemplateOutput {
                    replacement: String::new(),
                    rationale: "import is never referenced in this file".to_string(),
                })
            },
        },
        FixTemplate {
            id: "remove_stub_todo_marker",
            issue_type: "todo_marker",
            category: FixCategory::Refactor,
            base_safety_score: 0.4,
            build: |_issue, line| {
                Some(TemplateOutput {
                    replacement: line.to_string(),
                    rationale: "TODO markers require a human decision on the underlying work; flagged for review rather than auto-resolved".to_string(),
                })
            },
        },
        FixTemplate {
            id: "disable_shell_true",
            issue_type: "shell_injection_risk",
            category: FixCategory::Security,
            base_safety_score: 0.5,
            build: |_issue, line| {
                if !line.contains("shell=True") {
                    return None;
                }
                Some(TemplateOutput {
                    replacement: line.replacen("shell=True", "shell=False", 1),
                    rationale: "shell=False avoids shell interpolation of the command string".to_string(),
                })
            },
        },
    ];
    TEMPLATES
}

/// Template library + Pattern-Record-weighted scoring for Fix Proposals.
pub struct FixGenerator;

impl FixGenerator {
    /// Generate a Fix Proposal for `issue`, if a template matches its
    /// `issue_type`. `source_line` is the exact text of `issue.line` in
    /// `target_file`, used as `original_snippet` and passed to the
    /// template so it can build a well-formed replacement.
    ///
    /// Per spec §4.9's "Forbidden templates" rule, a template whose
    /// built replacement matches the Defense-in-Depth dangerous-pattern
    /// list is rejected here, at classification time, with
    /// `DangerousTemplate` — distinct from the Validator's later
    /// `pattern_gate`, which raises `DangerousPattern` if a proposal
    /// somehow reaches it with dangerous content anyway.
    pub fn generate(
        issue: &Issue,
        target_file: &str,
        source_line: &str,
        local_store: &MemoryHandle,
        config: &FixConfig,
    ) -> Result<Option<FixProposal>> {
        let Some(template) = templates().iter().find(|t| t.issue_type == issue.issue_type) else {
            return Ok(None);
        };
        let Some(output) = (template.build)(issue, source_line) else {
            return Ok(None);
        };

        if scan_dangerous_patterns(&output.replacement).is_err() {
            return Err(VigilError::dangerous_template(template.id));
        }

        let safety_score = weighted_safety_score(template, issue, local_store);
        let auto_safe = safety_score >= config.auto_safe_threshold
            && config
                .auto_safe_categories
                .iter()
                .any(|c| c == template.id);

        Ok(Some(FixProposal {
            issue: issue.clone(),
            target_file: target_file.to_string(),
            original_snippet: source_line.to_string(),
            replacement_snippet: output.replacement,
            line_range: (issue.line, issue.line),
            category: template.category,
            safety_score,
            auto_safe,
            rationale: output.rationale,
            rollback_blob: source_line.to_string(),
            template_id: template.id.to_string(),
        }))
    }
}

fn weighted_safety_score(template: &FixTemplate, issue: &Issue, local_store: &MemoryHandle) -> f64 {
    let Ok(result) = local_store.search(&issue.issue_type, 1, None) else {
        return template.base_safety_score;
    };
    let Some(hit) = result.hits.into_iter().next() else {
        return template.base_safety_score;
    };
    let patterns = local_store.all_patterns();
    let Some(pattern) = patterns.iter().find(|p| p.pattern_id == hit.pattern_id) else {
        return template.base_safety_score;
    };
    let total = pattern.success_count + pattern.failure_count;
    if total == 0 {
        return template.base_safety_score;
    }
    // Blend the template's static prior with the pattern's measured reuse
    // rate: templates that keep failing in practice get demoted even if
    // their static prior is high, and vice versa.
    0.4 * template.base_safety_score + 0.6 * pattern.reuse_rate()
}

/// Splice `replacement` (may be empty, in which case the range is simply
/// deleted) into `content` over the 1-based inclusive `line_range`.
/// Shared by the Fix Generator, the Approval Session's preview, and the
/// Automated Patcher's line-range modifications.
pub fn apply_line_range(content: &str, line_range: (usize, usize), replacement: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = line_range;
    let start_idx = start.saturating_sub(1).min(lines.len());
    let end_idx = end.min(lines.len());

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..start_idx]);
    let replacement_lines: Vec<&str> = replacement.lines().collect();
    out.extend_from_slice(&replacement_lines);
    out.extend_from_slice(&lines[end_idx..]);

    let mut joined = out.join("\n");
    if content.ends_with('\n') && !joined.is_empty() {
        joined.push('\n');
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::issue::Severity;
    use crate::memory::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn handle() -> MemoryHandle {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(
            dir.into_path(),
            Arc::new(crate::memory::EmbeddingOracle::new(None)),
            Duration::from_secs(2),
        );
        store.open("python").unwrap()
    }

    fn unused_import_issue() -> Issue {
        Issue {
            issue_type: "unused_import".into(),
            file_path: "a.py".into(),
            line: 1,
            column: None,
            severity: Severity::Low,
            description: "'os' is imported but never referenced".into(),
            educational_content: String::new(),
            suggestion: Some("remove the unused import of 'os'".into()),
            similar_patterns: Vec::new(),
            context_tags: Vec::new(),
        }
    }

    #[test]
    fn apply_line_range_deletes_the_target_line() {
        let content = "import os\nimport sys\nprint(\"hi\")\n";
        let result = apply_line_range(content, (1, 1), "");
        assert_eq!(result, "import sys\nprint(\"hi\")\n");
    }

    #[test]
    fn unused_import_yields_an_auto_safe_proposal() {
        let issue = unused_import_issue();
        let store = handle();
        let config = FixConfig::default();
        let proposal = FixGenerator::generate(&issue, "a.py", "import os", &store, &config)
            .unwrap()
            .unwrap();
        assert_eq!(proposal.template_id, "remove_unused_import");
        assert!(proposal.auto_safe);
        assert_eq!(proposal.replacement_snippet, "");
    }

    #[test]
    fn shell_true_fix_is_not_auto_safe() {
        let issue = Issue {
            issue_type: "shell_injection_risk".into(),
            file_path: "a.py".into(),
            line: 3,
            column: None,
            severity: Severity::High,
            description: "subprocess invoked with shell=True".into(),
            educational_content: String::new(),
            suggestion: None,
            similar_patterns: Vec::new(),
            context_tags: Vec::new(),
        };
        let store = handle();
        let config = FixConfig::default();
        let proposal =
            FixGenerator::generate(&issue, "a.py", "subprocess.run(cmd, shell=True)", &store, &config)
                .unwrap()
                .unwrap();
        assert!(!proposal.auto_safe);
        assert_eq!(proposal.replacement_snippet, "subprocess.run(cmd, shell=False)");
    }

    #[test]
    fn no_template_matches_unknown_issue_type() {
        let issue = Issue {
            issue_type: "no_such_type".into(),
            file_path: "a.py".into(),
            line: 1,
            column: None,
            severity: Severity::Low,
            description: String::new(),
            educational_content: String::new(),
            suggestion: None,
            similar_patterns: Vec::new(),
            context_tags: Vec::new(),
        };
        let store = handle();
        let config = FixConfig::default();
        assert!(FixGenerator::generate(&issue, "a.py", "", &store, &config)
            .unwrap()
            .is_none());
    }

    #[test]
    fn template_producing_dangerous_replacement_is_rejected_at_classification() {
        let issue = Issue {
            issue_type: "todo_marker".into(),
            file_path: "a.py".into(),
            line: 5,
            column: None,
            severity: Severity::Low,
            description: "stub marker left in source".into(),
            educational_content: String::new(),
            suggestion: None,
            similar_patterns: Vec::new(),
            context_tags: Vec::new(),
        };
        let store = handle();
        let config = FixConfig::default();
        let err = FixGenerator::generate(&issue, "a.py", "eval(user_input)  # TODO", &store, &config)
            .unwrap_err();
        assert!(matches!(err, VigilError::DangerousTemplate { template_id } if template_id == "remove_stub_todo_marker"));
    }
}
