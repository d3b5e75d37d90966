//! Fix Generator & Approval (C11, approval half): the interactive
//! accept/reject/skip/abort contract over a Fix Proposal, and the
//! learning write-back into the `intelligent_fix_generator` namespace.

use console::style;
use dialoguer::{theme::ColorfulTheme, Select};
use serde_json::json;

use chrono::Utc;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::errors::Result;
use crate::fixes::generator::FixProposal;
use crate::memory::{MemoryHandle, Namespace};

/// A single approval decision, per spec §4.9's UI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Apply this proposal.
    Accept,
    /// Do not apply this proposal; counts against the template's
    /// learned priority for similar contexts.
    Reject,
    /// Leave this proposal pending; no learning signal recorded.
    Skip,
    /// Stop the whole approval session; remaining proposals are left
    /// untouched.
    AbortSession,
}

impl ApprovalDecision {
    fn outcome_label(self) -> Option<&'static str> {
        match self {
            ApprovalDecision::Accept => Some("accepted"),
            ApprovalDecision::Reject => Some("rejected"),
            ApprovalDecision::Skip | ApprovalDecision::AbortSession => None,
        }
    }
}

/// Drives approval over a batch of Fix Proposals for one language store,
/// recording every non-skip decision as it's made.
pub struct ApprovalSession<'a> {
    local_store: &'a MemoryHandle,
    /// When true, every `auto_safe` proposal is accepted without
    /// prompting; non-`auto_safe` proposals still prompt. Set by
    /// `fix --auto-safe-only` and similar non-interactive invocations.
    auto_safe_only: bool,
}

impl<'a> ApprovalSession<'a> {
    /// Build a session writing learning records into `local_store`.
    pub fn new(local_store: &'a MemoryHandle) -> Self {
        Self {
            local_store,
            auto_safe_only: false,
        }
    }

    /// Restrict this session to auto-applying `auto_safe` proposals and
    /// skipping everything else, with no interactive prompting at all.
    pub fn auto_safe_only(mut self) -> Self {
        self.auto_safe_only = true;
        self
    }

    /// Decide every proposal in `proposals`, stopping early on
    /// `AbortSession`. Returns the decision made for each proposal
    /// actually considered (shorter than `proposals` if aborted).
    pub fn run(&self, proposals: &[FixProposal]) -> Result<Vec<(FixProposal, ApprovalDecision)>> {
        let mut decisions = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let decision = self.decide_one(proposal)?;
            let aborted = decision == ApprovalDecision::AbortSession;
            decisions.push((proposal.clone(), decision));
            if aborted {
                break;
            }
        }
        Ok(decisions)
    }

    fn decide_one(&self, proposal: &FixProposal) -> Result<ApprovalDecision> {
        let decision = if proposal.auto_safe {
            ApprovalDecision::Accept
        } else if self.auto_safe_only {
            ApprovalDecision::Skip
        } else {
            prompt(proposal)
        };
        self.record(proposal, decision)?;
        Ok(decision)
    }

    fn record(&self, proposal: &FixProposal, decision: ApprovalDecision) -> Result<()> {
        let Some(outcome) = decision.outcome_label() else {
            return Ok(());
        };
        let fingerprint = context_fingerprint(proposal);
        let key = format!("{}:{fingerprint}", proposal.template_id);
        let value = json!({
            "template_id": proposal.template_id,
            "context_fingerprint": fingerprint,
            "outcome": outcome,
            "recorded_at": Utc::now().to_rfc3339(),
        });
        self.local_store
            .put_namespace_entry(Namespace::IntelligentFixGenerator, &key, value)
    }
}

/// A stable key for "this template, in roughly this kind of context":
/// the issue type and the file's extension, hashed so the namespace key
/// doesn't grow unbounded with distinct file paths.
fn context_fingerprint(proposal: &FixProposal) -> String {
    let extension = proposal
        .target_file
        .rsplit('.')
        .next()
        .unwrap_or("");
    let basis = format!("{}:{extension}", proposal.issue.issue_type);
    format!("{:016x}", xxh3_64(basis.as_bytes()))
}

fn prompt(proposal: &FixProposal) -> ApprovalDecision {
    println!(
        "\n{} {} ({})",
        style("fix:").bold(),
        proposal.target_file,
        proposal.category.as_str()
    );
    println!("{}", style(&proposal.rationale).dim());
    for line in proposal.original_snippet.lines() {
        println!("{}", style(format!("- {line}")).red());
    }
    for line in proposal.replacement_snippet.lines() {
        println!("{}", style(format!("+ {line}")).green());
    }

    let options = ["Accept", "Reject", "Skip", "Abort session"];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Apply this fix?")
        .items(&options)
        .default(2)
        .interact_opt()
        .unwrap_or(None);

    match selection {
        Some(0) => ApprovalDecision::Accept,
        Some(1) => ApprovalDecision::Reject,
        Some(3) => ApprovalDecision::AbortSession,
        _ => ApprovalDecision::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::issue::{Issue, Severity};
    use crate::fixes::generator::FixCategory;
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

    fn auto_safe_proposal() -> FixProposal {
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
    fn auto_safe_proposal_is_accepted_without_prompting() {
        let store = handle();
        let session = ApprovalSession::new(&store);
        let decisions = session.run(&[auto_safe_proposal()]).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].1, ApprovalDecision::Accept);
    }

    #[test]
    fn accepted_proposal_is_recorded_in_the_learning_namespace() {
        let store = handle();
        let session = ApprovalSession::new(&store);
        session.run(&[auto_safe_proposal()]).unwrap();
        let namespaces = store.namespaces();
        assert!(!namespaces.intelligent_fix_generator.is_empty());
    }

    #[test]
    fn auto_safe_only_session_skips_non_auto_safe_proposals() {
        let store = handle();
        let mut proposal = auto_safe_proposal();
        proposal.auto_safe = false;
        let session = ApprovalSession::new(&store).auto_safe_only();
        let decisions = session.run(&[proposal]).unwrap();
        assert_eq!(decisions[0].1, ApprovalDecision::Skip);
    }

    #[test]
    fn context_fingerprint_is_stable_for_the_same_issue_type_and_extension() {
        let a = auto_safe_proposal();
        let mut b = auto_safe_proposal();
        b.target_file = "other.py".into();
        assert_eq!(context_fingerprint(&a), context_fingerprint(&b));
    }
}
