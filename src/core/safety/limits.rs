//! Recursion/time/concurrency limit tracking and the emergency-stop flag.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::core::config::SafetyConfig;
use crate::core::errors::{Result, VigilError};

/// Tracks the live counters the Safety Envelope enforces limits against.
#[derive(Debug)]
pub struct LimitTracker {
    max_recursion_depth: u32,
    max_operation_seconds: u64,
    max_concurrent_ops: usize,
    recursion_depth: AtomicU32,
    active_ops: AtomicUsize,
    emergency_stop: AtomicBool,
    emergency_stop_file: Option<PathBuf>,
}

impl LimitTracker {
    /// Build a tracker from configured limits.
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            max_recursion_depth: config.max_recursion_depth,
            max_operation_seconds: config.max_operation_seconds,
            max_concurrent_ops: config.max_concurrent_ops,
            recursion_depth: AtomicU32::new(0),
            active_ops: AtomicUsize::new(0),
            emergency_stop: AtomicBool::new(false),
            emergency_stop_file: config.emergency_stop_file.clone(),
        }
    }

    /// Enter one recursion level, failing with [`VigilError::LimitExceeded`]
    /// if it would exceed the configured maximum.
    pub fn enter_recursion(&self) -> Result<RecursionGuard<'_>> {
        let depth = self.recursion_depth.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > self.max_recursion_depth {
            self.recursion_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(VigilError::limit_exceeded(
                "max_recursion_depth",
                u64::from(depth),
                u64::from(self.max_recursion_depth),
            ));
        }
        Ok(RecursionGuard { tracker: self })
    }

    /// Enter one outward operation slot, failing if the concurrency cap
    /// is already reached.
    pub fn enter_operation(&self) -> Result<OperationGuard<'_>> {
        let count = self.active_ops.fetch_add(1, Ordering::SeqCst) + 1;
        if count > self.max_concurrent_ops {
            self.active_ops.fetch_sub(1, Ordering::SeqCst);
            return Err(VigilError::limit_exceeded(
                "max_concurrent_ops",
                count as u64,
                self.max_concurrent_ops as u64,
            ));
        }
        Ok(OperationGuard {
            tracker: self,
            deadline: Instant::now() + Duration::from_secs(self.max_operation_seconds),
        })
    }

    /// Check whether the configured deadline for an operation has
    /// already passed.
    pub fn check_deadline(&self, deadline: Instant, operation: &str) -> Result<()> {
        if Instant::now() > deadline {
            return Err(VigilError::timeout(operation, self.max_operation_seconds));
        }
        Ok(())
    }

    /// Cooperative checkpoint: returns `Err(EmergencyStop)` once the
    /// emergency stop has been engaged (in-process flag or flag file).
    /// Callers poll this at batch boundaries, store queries, sandbox
    /// subprocess boundaries, and approval prompts.
    pub fn checkpoint(&self) -> Result<()> {
        if self.emergency_stop.load(Ordering::SeqCst) {
            return Err(VigilError::EmergencyStop);
        }
        if let Some(path) = &self.emergency_stop_file {
            if path.exists() {
                self.emergency_stop.store(true, Ordering::SeqCst);
                return Err(VigilError::EmergencyStop);
            }
        }
        Ok(())
    }

    /// Engage the in-process emergency stop immediately, independent of
    /// the flag file.
    pub fn trigger_emergency_stop(&self) {
        self.emergency_stop.store(true, Ordering::SeqCst);
    }

    /// Current recursion depth, for metrics/stats.
    pub fn current_recursion_depth(&self) -> u32 {
        self.recursion_depth.load(Ordering::SeqCst)
    }
}

/// Released automatically when a recursion level completes.
pub struct RecursionGuard<'a> {
    tracker: &'a LimitTracker,
}

impl Drop for RecursionGuard<'_> {
    fn drop(&mut self) {
        self.tracker.recursion_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Released automatically when an outward operation completes, whether
/// it returns normally or panics.
pub struct OperationGuard<'a> {
    tracker: &'a LimitTracker,
    /// Deadline this operation must finish by.
    pub deadline: Instant,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.tracker.active_ops.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursion_past_depth_is_rejected_then_released() {
        let mut config = SafetyConfig::default();
        config.max_recursion_depth = 1;
        let tracker = LimitTracker::new(&config);
        let guard = tracker.enter_recursion().unwrap();
        assert!(tracker.enter_recursion().is_err());
        drop(guard);
        assert!(tracker.enter_recursion().is_ok());
    }

    #[test]
    fn concurrency_cap_is_enforced() {
        let mut config = SafetyConfig::default();
        config.max_concurrent_ops = 1;
        let tracker = LimitTracker::new(&config);
        let guard = tracker.enter_operation().unwrap();
        assert!(tracker.enter_operation().is_err());
        drop(guard);
        assert!(tracker.enter_operation().is_ok());
    }

    #[test]
    fn checkpoint_trips_after_trigger() {
        let config = SafetyConfig::default();
        let tracker = LimitTracker::new(&config);
        assert!(tracker.checkpoint().is_ok());
        tracker.trigger_emergency_stop();
        assert!(matches!(tracker.checkpoint(), Err(VigilError::EmergencyStop)));
    }
}
