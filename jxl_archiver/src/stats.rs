//! Stats Aggregator: run-wide counters, updated from multiple worker
//! threads via atomics so no lock is needed on the hot path.
//!
//! `images_processed` increments only when [`Stats::record_outcome`] sees
//! a [`JobOutcome::Converted`] — i.e. only after the atomic replacer's
//! rename has already committed. A stage that succeeds but whose output
//! later fails verification, or whose rename fails, never counts here.

use crate::error::JobError;
use crate::job::JobOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    images_processed: AtomicU64,
    skipped: AtomicU64,
    plan_failures: AtomicU64,
    timeouts: AtomicU64,
    verification_failures: AtomicU64,
    metadata_warnings: AtomicU64,
    filesystem_fatal: AtomicU64,
    aborted: AtomicU64,
    bytes_before: AtomicU64,
    bytes_after: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    pub images_processed: u64,
    pub skipped: u64,
    pub plan_failures: u64,
    pub timeouts: u64,
    pub verification_failures: u64,
    pub metadata_warnings: u64,
    pub filesystem_fatal: u64,
    pub aborted: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Converted { output, source_bytes, .. } => {
                self.images_processed.fetch_add(1, Ordering::Relaxed);
                if let Ok(meta) = std::fs::metadata(output) {
                    self.bytes_after.fetch_add(meta.len(), Ordering::Relaxed);
                }
                self.bytes_before.fetch_add(*source_bytes, Ordering::Relaxed);
            }
            JobOutcome::Failed(err) => self.record_error(err),
        }
    }

    fn record_error(&self, err: &JobError) {
        let counter = match err {
            JobError::Skipped { .. } => &self.skipped,
            JobError::PlanFailure { .. } => &self.plan_failures,
            JobError::Timeout { .. } => &self.timeouts,
            JobError::VerificationFailed { .. } => &self.verification_failures,
            JobError::MetadataWarning { .. } => &self.metadata_warnings,
            JobError::FilesystemFatal { .. } => &self.filesystem_fatal,
            JobError::Aborted { .. } => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            images_processed: self.images_processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            plan_failures: self.plan_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            verification_failures: self.verification_failures.load(Ordering::Relaxed),
            metadata_warnings: self.metadata_warnings.load(Ordering::Relaxed),
            filesystem_fatal: self.filesystem_fatal.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            bytes_before: self.bytes_before.load(Ordering::Relaxed),
            bytes_after: self.bytes_after.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::PropagationTier;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn failed_outcomes_never_increment_images_processed() {
        let stats = Stats::new();
        stats.record_outcome(&JobOutcome::Failed(JobError::PlanFailure {
            path: PathBuf::from("a"),
            reason: "x".into(),
        }));
        assert_eq!(stats.snapshot().images_processed, 0);
        assert_eq!(stats.snapshot().plan_failures, 1);
    }

    #[test]
    fn converted_outcome_increments_images_processed_once() {
        let stats = Stats::new();
        stats.record_outcome(&JobOutcome::Converted {
            source: PathBuf::from("/nonexistent/a.png"),
            output: PathBuf::from("/nonexistent/a.jxl"),
            duration: Duration::from_secs(1),
            metadata_tier: PropagationTier::FilesystemOnly,
            source_bytes: 1234,
        });
        assert_eq!(stats.snapshot().images_processed, 1);
        assert_eq!(stats.snapshot().bytes_before, 1234);
    }
}
