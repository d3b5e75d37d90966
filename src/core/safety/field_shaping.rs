//! Field-shaping: non-authoritative guidance on sensitive operations.
//!
//! Resonance counters here are observability only. Nothing in this module
//! can grant permission a hard-safety gate denies — every [`evaluate`]
//! result of [`Verdict::Deny`] overrides any guidance/redirect outcome a
//! caller might otherwise prefer.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome of evaluating a sensitive operation's "intention".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Proceed normally.
    Allow,
    /// Proceed, but surface guidance text to the operator/log.
    AllowWithGuidance,
    /// Proceed via an alternative, safer path instead.
    Redirect,
    /// Hard deny. Authoritative; never overridden by guidance/redirect.
    Deny,
}

/// Usage-metric counters. Read-only from the outside; never consulted by
/// [`evaluate`] or any access decision.
#[derive(Debug, Default, Serialize)]
pub struct ResonanceCounters {
    boundary_comfort: AtomicU64,
    project_focus: AtomicU64,
    security_appreciation: AtomicU64,
    helpful_alignment: AtomicU64,
    curiosity_redirection: AtomicU64,
}

impl ResonanceCounters {
    /// Snapshot the counters for `stats`/`metrics` output.
    pub fn snapshot(&self) -> ResonanceSnapshot {
        ResonanceSnapshot {
            boundary_comfort: self.boundary_comfort.load(Ordering::Relaxed),
            project_focus: self.project_focus.load(Ordering::Relaxed),
            security_appreciation: self.security_appreciation.load(Ordering::Relaxed),
            helpful_alignment: self.helpful_alignment.load(Ordering::Relaxed),
            curiosity_redirection: self.curiosity_redirection.load(Ordering::Relaxed),
        }
    }

    fn bump(&self, verdict: Verdict) {
        match verdict {
            Verdict::Allow => self.helpful_alignment.fetch_add(1, Ordering::Relaxed),
            Verdict::AllowWithGuidance => self.project_focus.fetch_add(1, Ordering::Relaxed),
            Verdict::Redirect => self.curiosity_redirection.fetch_add(1, Ordering::Relaxed),
            Verdict::Deny => self.security_appreciation.fetch_add(1, Ordering::Relaxed),
        };
        self.boundary_comfort.fetch_add(1, Ordering::Relaxed);
    }
}

/// Read-only counter values for reporting.
#[derive(Debug, Serialize)]
pub struct ResonanceSnapshot {
    boundary_comfort: u64,
    project_focus: u64,
    security_appreciation: u64,
    helpful_alignment: u64,
    curiosity_redirection: u64,
}

/// Kinds of sensitive operation the field-shaping evaluation applies to.
#[derive(Debug, Clone, Copy)]
pub enum SensitiveOp {
    /// A network call.
    Network,
    /// A file access outside the project boundary (already independently
    /// denied by the envelope's boundary check; field-shaping only adds
    /// guidance framing here, it never has to veto since the boundary
    /// check already did).
    CrossBoundary,
    /// The engine attempting to modify its own installed binary or
    /// source — always denied, see `core::safety::envelope`.
    SelfModification,
}

/// Evaluate a sensitive operation's rationale and return a non-binding
/// (except for [`Verdict::Deny`]) verdict, bumping the observability
/// counters.
pub fn evaluate(counters: &ResonanceCounters, op: SensitiveOp, _rationale: &str) -> Verdict {
    let verdict = match op {
        SensitiveOp::SelfModification => Verdict::Deny,
        SensitiveOp::Network => Verdict::AllowWithGuidance,
        SensitiveOp::CrossBoundary => Verdict::Redirect,
    };
    counters.bump(verdict);
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_modification_is_always_denied() {
        let counters = ResonanceCounters::default();
        let verdict = evaluate(&counters, SensitiveOp::SelfModification, "patch own binary");
        assert_eq!(verdict, Verdict::Deny);
    }

    #[test]
    fn counters_are_observability_only() {
        let counters = ResonanceCounters::default();
        evaluate(&counters, SensitiveOp::Network, "telemetry ping");
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.boundary_comfort, 1);
    }
}
