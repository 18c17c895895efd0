//! Fallback Orchestrator: runs a plan's ordered steps in turn, stopping at
//! the first one that produces a usable output. Each failed step is
//! logged with its reason before the next is attempted; if every step
//! fails the job fails with the *last* step's error, since it's usually
//! the most specific.

use crate::error::JobError;
use crate::job::Job;
use crate::plan::ConversionPlan;
use crate::stage_runner::{self, StageProduct};
use crate::tool_registry::ToolRegistry;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Run every step of `plan` in order against `job`, stopping at the first
/// success. Returns the path to the job's final (not-yet-renamed) JXL
/// output.
pub fn run_plan(
    plan: &ConversionPlan,
    job: &Job,
    scratch_dir: &Path,
    registry: &ToolRegistry,
    deadline: Instant,
    encoder_threads: Option<usize>,
) -> Result<PathBuf, JobError> {
    let mut last_err: Option<JobError> = None;

    for (index, &step) in plan.steps.iter().enumerate() {
        tracing::debug!(
            path = %job.source.display(),
            step = ?step,
            attempt = index + 1,
            total = plan.steps.len(),
            "attempting stage"
        );

        let result = stage_runner::run_step(step, job, scratch_dir, registry, deadline, encoder_threads)
            .and_then(|product| match product {
                StageProduct::FinalJxl(path) => Ok(path),
                StageProduct::Intermediate(intermediate) => {
                    let final_path = stage_runner::finish_from_intermediate(
                        job,
                        &intermediate,
                        registry,
                        deadline,
                        encoder_threads,
                    );
                    let _ = std::fs::remove_file(&intermediate);
                    final_path
                }
            });

        match result {
            Ok(path) => {
                if index > 0 {
                    tracing::info!(
                        path = %job.source.display(),
                        step = ?step,
                        attempt = index + 1,
                        "recovered via fallback step"
                    );
                }
                return Ok(path);
            }
            Err(e) => {
                tracing::warn!(
                    path = %job.source.display(),
                    step = ?step,
                    error = %e,
                    "stage failed, trying next fallback"
                );
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| JobError::PlanFailure {
        path: job.source.clone(),
        reason: "plan had no steps".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, Format};
    use crate::plan::Step;
    use crate::verify::VerificationPolicy;
    use std::time::Duration;

    #[test]
    fn empty_plan_fails_with_plan_failure() {
        let job = Job::new(
            PathBuf::from("/tmp/a.heic"),
            Classification { format: Some(Format::Heic), animated: false, is_live_photo: false },
        );
        let plan = ConversionPlan { steps: vec![], verification: VerificationPolicy::DecodeOnly };
        let registry = ToolRegistry::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = run_plan(&plan, &job, Path::new("/tmp"), &registry, deadline, None).unwrap_err();
        assert!(matches!(err, JobError::PlanFailure { .. }));
    }

    #[test]
    fn missing_tools_fall_through_every_step_and_report_last_error() {
        let job = Job::new(
            PathBuf::from("/tmp/does-not-exist.heic"),
            Classification { format: Some(Format::Heic), animated: false, is_live_photo: false },
        );
        let plan = ConversionPlan {
            steps: vec![Step::RasterConvertToPng, Step::HeifConvertToTiff],
            verification: VerificationPolicy::DecodeOnly,
        };
        let registry = ToolRegistry::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        let result = run_plan(&plan, &job, Path::new("/tmp"), &registry, deadline, None);
        assert!(result.is_err());
    }
}
