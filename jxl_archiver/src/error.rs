//! Closed, exhaustively-matched error taxonomy for a single job.
//!
//! `JobError` covers everything that can go wrong while converting one
//! file; it is distinct from the `anyhow::Result` used for process-level
//! setup (CLI validation, tool-registry startup, log directory creation),
//! which can fail in open-ended ways before any job exists.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    /// The file's extension/content doesn't map to a conversion plan
    /// (unsupported or intentionally-excluded format). The file is still
    /// counted, it just never dispatches a stage.
    #[error("skipped {path}: {reason}")]
    Skipped { path: PathBuf, reason: String },

    /// The plan builder could not construct a stage sequence for a format
    /// that is otherwise recognized (e.g. vector/layered formats that have
    /// no JXL-equivalent raster pipeline).
    #[error("no conversion plan for {path}: {reason}")]
    PlanFailure { path: PathBuf, reason: String },

    /// A stage (or the fallback chain) did not finish within its deadline.
    #[error("{path} timed out after {elapsed_secs}s running {stage}")]
    Timeout {
        path: PathBuf,
        stage: String,
        elapsed_secs: u64,
    },

    /// The converted output failed the verification policy for its format.
    #[error("verification failed for {path}: {reason}")]
    VerificationFailed { path: PathBuf, reason: String },

    /// Metadata propagation degraded below the expected tier or the
    /// non-blocking verification pass found a mismatch. Never fatal to the
    /// job on its own — surfaced so the caller can decide whether to log
    /// only or also count it.
    #[error("metadata warning for {path}: {reason}")]
    MetadataWarning { path: PathBuf, reason: String },

    /// A filesystem operation failed in a way that isn't covered by the
    /// more specific variants above (permission denied, disk full, rename
    /// across a different stale mount, etc).
    #[error("filesystem error for {path}: {source}")]
    FilesystemFatal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job was cancelled before completion (Ctrl-C, or a sibling job's
    /// fatal error tripped a shutdown for the whole run).
    #[error("{path} aborted: {reason}")]
    Aborted { path: PathBuf, reason: String },
}

impl JobError {
    pub fn path(&self) -> &PathBuf {
        match self {
            JobError::Skipped { path, .. }
            | JobError::PlanFailure { path, .. }
            | JobError::Timeout { path, .. }
            | JobError::VerificationFailed { path, .. }
            | JobError::MetadataWarning { path, .. }
            | JobError::FilesystemFatal { path, .. }
            | JobError::Aborted { path, .. } => path,
        }
    }

    /// Stable short name of the variant, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Skipped { .. } => "skipped",
            JobError::PlanFailure { .. } => "plan_failure",
            JobError::Timeout { .. } => "timeout",
            JobError::VerificationFailed { .. } => "verification_failed",
            JobError::MetadataWarning { .. } => "metadata_warning",
            JobError::FilesystemFatal { .. } => "filesystem_fatal",
            JobError::Aborted { .. } => "aborted",
        }
    }

    pub fn filesystem(path: PathBuf, source: std::io::Error) -> Self {
        JobError::FilesystemFatal { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_reports_a_kind_and_path() {
        let variants = vec![
            JobError::Skipped { path: "a".into(), reason: "x".into() },
            JobError::PlanFailure { path: "a".into(), reason: "x".into() },
            JobError::Timeout { path: "a".into(), stage: "cjxl".into(), elapsed_secs: 5 },
            JobError::VerificationFailed { path: "a".into(), reason: "x".into() },
            JobError::MetadataWarning { path: "a".into(), reason: "x".into() },
            JobError::FilesystemFatal {
                path: "a".into(),
                source: std::io::Error::other("disk full"),
            },
            JobError::Aborted { path: "a".into(), reason: "x".into() },
        ];
        for v in variants {
            assert_eq!(v.path(), &PathBuf::from("a"));
            assert!(!v.kind().is_empty());
        }
    }
}
