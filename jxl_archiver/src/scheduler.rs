//! Job Scheduler: walks the root directory, classifies every file, and
//! runs the pipeline (plan -> fallback -> verify -> replace) across a
//! fixed-size worker pool bounded by [`concurrency::ConcurrencyBudget`].
//!
//! Workers pull from a shared queue rather than each owning a static
//! slice of the file list, so a run with a skewed mix of cheap PNGs and
//! slow HEIC fallback chains keeps every thread busy until the queue is
//! drained.

use crate::cancellation::{self, CancellationToken};
use crate::cli::VerifyProfile;
use crate::classifier;
use crate::concurrency::{self, ConcurrencyBudget};
use crate::error::JobError;
use crate::fallback;
use crate::job::{Job, JobOutcome};
use crate::plan;
use crate::replacer;
use crate::stats::Stats;
use crate::tool_registry::ToolRegistry;
use crate::verify;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use walkdir::WalkDir;

/// Run-wide configuration the scheduler needs, independent of CLI parsing
/// details living in [`crate::cli`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub root: PathBuf,
    pub workers: Option<usize>,
    pub verify: VerifyProfile,
    pub copy: bool,
    pub sample: Option<usize>,
    pub dry_run: bool,
    pub skip_existing: bool,
    pub timeout: Duration,
    pub retries: u32,
    pub encoder_threads: Option<usize>,
}

/// If `copy` is set, clone `root` into a sibling `<name>_work` directory
/// and return that path instead; the run then operates entirely on the
/// copy, leaving the original tree untouched.
fn resolve_working_root(root: &Path, copy: bool) -> anyhow::Result<PathBuf> {
    if !copy {
        return Ok(root.to_path_buf());
    }
    let name = root
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("root directory has no file name component"))?;
    let mut work_name = name.to_os_string();
    work_name.push("_work");
    let work_root = root.with_file_name(work_name);

    for entry in WalkDir::new(root) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(root)?;
        let target = work_root.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(work_root)
}

/// Reduce the discovered jobs down to `count` median-sized candidates by
/// file size, when a sample size was requested.
fn apply_sample(mut jobs: Vec<Job>, sample: Option<usize>) -> Vec<Job> {
    let Some(count) = sample else {
        return jobs;
    };
    if jobs.len() <= count {
        return jobs;
    }
    jobs.sort_by_key(|job| std::fs::metadata(&job.source).map(|m| m.len()).unwrap_or(0));
    let start = (jobs.len() - count) / 2;
    jobs.drain(start..start + count).collect()
}

pub struct RunReport {
    pub stats: Stats,
    pub outcomes: Vec<JobOutcome>,
}

/// Discover every regular file under `root`, skipping hidden files and
/// anything already carrying a `.jxl` extension when `skip_existing` asks
/// for it to be left alone.
fn discover_jobs(root: &Path, skip_existing: bool) -> Vec<Job> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !shared_utils::is_hidden_file(entry.path()))
        .filter_map(|entry| {
            let path = entry.into_path();
            if skip_existing && path.extension().and_then(|e| e.to_str()) == Some("jxl") {
                return None;
            }
            match classifier::classify(&path) {
                Ok(classification) => Some(Job::new(path, classification)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to classify file, skipping");
                    None
                }
            }
        })
        .collect()
}

/// Run one job end to end: build a plan, execute the fallback chain,
/// verify the result, and atomically replace the source. Every error path
/// returns a [`JobError`] rather than panicking; the scheduler's worker
/// loop never lets one job's failure stop the others.
fn run_one_job(
    job: Job,
    registry: &ToolRegistry,
    scratch_dir: &Path,
    options: &RunOptions,
    cancellation: &CancellationToken,
) -> JobOutcome {
    let started = std::time::Instant::now();
    let source = job.source.clone();

    if cancellation.is_cancelled() {
        return JobOutcome::Failed(JobError::Aborted {
            path: source,
            reason: "run cancelled before this job started".to_string(),
        });
    }

    let result = (|| -> Result<(PathBuf, shared_utils::PropagationTier, u64), JobError> {
        let plan = plan::build_plan(&job)?;

        if options.dry_run {
            return Err(JobError::Skipped {
                path: job.source.clone(),
                reason: "dry run, no conversion performed".to_string(),
            });
        }

        let source_is_heic_or_heif = matches!(
            job.format(),
            Some(crate::classifier::Format::Heic) | Some(crate::classifier::Format::Heif)
        );
        let verification_policy = match options.verify {
            VerifyProfile::Strict => plan.verification,
            VerifyProfile::Fast => verify::relax_for_fast_profile(plan.verification),
        };

        // Retries cover the encode+verify attempt only; plan building and
        // the eventual metadata/rename steps run once.
        let mut attempt = 0;
        let tmp_output = loop {
            let deadline = cancellation::job_deadline(options.timeout);
            let attempt_result = fallback::run_plan(&plan, &job, scratch_dir, registry, deadline, options.encoder_threads)
                .and_then(|tmp| {
                    verify::verify(verification_policy, &job.source, &tmp, source_is_heic_or_heif)
                        .map(|_| tmp)
                        .map_err(|e| {
                            let _ = std::fs::remove_file(&tmp);
                            e
                        })
                });

            match attempt_result {
                Ok(tmp) => break tmp,
                Err(e) if attempt < options.retries => {
                    tracing::warn!(
                        path = %job.source.display(),
                        attempt = attempt + 1,
                        error = %e,
                        "encode+verify attempt failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        // Captured before the atomic replacer unlinks the source; nothing
        // will be left to stat afterwards.
        let source_bytes = std::fs::metadata(&job.source).map(|m| m.len()).unwrap_or(0);

        let final_output = job.output_path();
        let tier = replacer::replace(&job.source, &tmp_output, &final_output)
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp_output);
                e
            })?;
        Ok((final_output, tier, source_bytes))
    })();

    match result {
        Ok((output, metadata_tier, source_bytes)) => JobOutcome::Converted {
            source,
            output,
            duration: started.elapsed(),
            metadata_tier,
            source_bytes,
        },
        Err(e) => JobOutcome::Failed(e),
    }
}

/// Run the full pipeline over every discovered job, using a worker pool
/// sized by [`concurrency::compute_budget`].
pub fn run(mut options: RunOptions, cancellation: CancellationToken) -> anyhow::Result<RunReport> {
    let registry = ToolRegistry::new();
    if let Err(missing) = registry.check_required() {
        anyhow::bail!(
            "required tool(s) not found on PATH, aborting before any job is dispatched: {}",
            missing.join(", ")
        );
    }

    options.root = resolve_working_root(&options.root, options.copy)?;

    let jobs = discover_jobs(&options.root, options.skip_existing);
    let jobs = apply_sample(jobs, options.sample);
    tracing::info!(count = jobs.len(), root = %options.root.display(), "discovered files");

    let cores = num_cpus::get();
    let budget: ConcurrencyBudget = concurrency::compute_budget(cores, options.workers);
    tracing::info!(
        worker_count = budget.worker_count,
        process_permits = budget.process_permits,
        fd_permits = budget.fd_permits,
        "resolved concurrency budget"
    );

    let scratch_dir = tempfile::Builder::new()
        .prefix("jxl_archiver-")
        .tempdir()
        .map_err(|e| anyhow::anyhow!("failed to create scratch directory: {}", e))?;
    let scratch_path = scratch_dir.path().to_path_buf();

    let outcomes: Mutex<Vec<JobOutcome>> = Mutex::new(Vec::with_capacity(jobs.len()));
    let next_index = AtomicUsize::new(0);
    let process_permits = concurrency::Semaphore::new(budget.process_permits);

    std::thread::scope(|scope| {
        for _ in 0..budget.worker_count.max(1) {
            let jobs = &jobs;
            let outcomes = &outcomes;
            let next_index = &next_index;
            let registry = &registry;
            let scratch_path = scratch_path.clone();
            let options = &options;
            let cancellation = cancellation.clone();
            let process_permits = process_permits.clone();

            scope.spawn(move || loop {
                let index = next_index.fetch_add(1, Ordering::SeqCst);
                let Some(job) = jobs.get(index) else {
                    break;
                };

                let _permit = process_permits.acquire();
                let outcome = run_one_job(job.clone(), registry, &scratch_path, options, &cancellation);
                outcomes.lock().unwrap_or_else(|e| e.into_inner()).push(outcome);
            });
        }
    });

    let outcomes = outcomes.into_inner().unwrap_or_else(|e| e.into_inner());
    let stats = Stats::new();
    for outcome in &outcomes {
        stats.record_outcome(outcome);
    }

    Ok(RunReport { stats, outcomes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, Format};

    fn job_at(path: &str) -> Job {
        Job::new(
            PathBuf::from(path),
            Classification { format: Some(Format::Png), animated: false, is_live_photo: false },
        )
    }

    #[test]
    fn apply_sample_passes_through_when_under_the_requested_count() {
        let jobs = vec![job_at("a"), job_at("b")];
        let sampled = apply_sample(jobs, Some(10));
        assert_eq!(sampled.len(), 2);
    }

    #[test]
    fn apply_sample_passes_through_when_no_sample_requested() {
        let jobs = vec![job_at("a"), job_at("b"), job_at("c")];
        let sampled = apply_sample(jobs, None);
        assert_eq!(sampled.len(), 3);
    }
}
