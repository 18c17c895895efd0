//! Command-line surface: a `clap`-derived parser resolved once at startup
//! into an immutable [`RunConfig`] threaded through to the scheduler.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerifyProfile {
    Strict,
    Fast,
}

#[derive(Parser, Debug)]
#[command(name = "jxl_archiver", author, version, about = "Batch-convert an image tree to JPEG XL in place", long_about = None)]
pub struct Cli {
    /// Root directory to walk for convertible images.
    pub root: PathBuf,

    /// Worker pool cap; 0 selects the core-count-derived default.
    #[arg(long, default_value_t = 0)]
    pub workers: usize,

    /// Verification profile: strict enforces pixel-exact where applicable,
    /// fast only checks dimensions for the pixel-exact formats.
    #[arg(long, value_enum, default_value_t = VerifyProfile::Strict)]
    pub verify: VerifyProfile,

    /// Operate on a sibling `_work` copy of the tree instead of in place.
    #[arg(long, default_value_t = false)]
    pub copy: bool,

    /// If > 0, process only this many median-sized candidates instead of
    /// the whole tree.
    #[arg(long, default_value_t = 0)]
    pub sample: usize,

    /// Skip files whose `.jxl` sibling already exists.
    #[arg(long = "skip-exist", default_value_t = false)]
    pub skip_exist: bool,

    /// Classify and plan but perform no encodes.
    #[arg(long = "dry-run", default_value_t = false)]
    pub dry_run: bool,

    /// Threads passed to the encoder per job.
    #[arg(long = "encoder-threads", default_value_t = 0)]
    pub encoder_threads: usize,

    /// Per-stage deadline in seconds; 0 disables the timeout.
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// How many times to rerun the encode+verify attempt on failure.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Raise the tracing level; repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Override the directory logs are written to.
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// Resolved, immutable run configuration derived from [`Cli`]. Read-only
/// from the moment it's built, mirroring the Tool Registry's
/// read-only-after-init discipline.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub root: PathBuf,
    pub workers: Option<usize>,
    pub verify: VerifyProfile,
    pub copy: bool,
    pub sample: Option<usize>,
    pub skip_exist: bool,
    pub dry_run: bool,
    pub encoder_threads: Option<usize>,
    pub timeout: Duration,
    pub retries: u32,
    pub verbose: u8,
    pub log_file: Option<PathBuf>,
}

impl From<Cli> for RunConfig {
    fn from(cli: Cli) -> Self {
        RunConfig {
            root: cli.root,
            workers: (cli.workers > 0).then_some(cli.workers),
            verify: cli.verify,
            copy: cli.copy,
            sample: (cli.sample > 0).then_some(cli.sample),
            skip_exist: cli.skip_exist,
            dry_run: cli.dry_run,
            encoder_threads: (cli.encoder_threads > 0).then_some(cli.encoder_threads),
            timeout: if cli.timeout == 0 {
                Duration::from_secs(u64::MAX / 2)
            } else {
                Duration::from_secs(cli.timeout)
            },
            retries: cli.retries,
            verbose: cli.verbose,
            log_file: cli.log_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn zero_workers_resolves_to_auto() {
        let cli = Cli::parse_from(["jxl_archiver", "/photos"]);
        let config: RunConfig = cli.into();
        assert_eq!(config.workers, None);
    }

    #[test]
    fn zero_timeout_disables_the_deadline_by_using_a_very_long_one() {
        let cli = Cli::parse_from(["jxl_archiver", "/photos", "--timeout", "0"]);
        let config: RunConfig = cli.into();
        assert!(config.timeout > Duration::from_secs(365 * 24 * 3600));
    }

    #[test]
    fn explicit_timeout_is_used_verbatim() {
        let cli = Cli::parse_from(["jxl_archiver", "/photos", "--timeout", "30"]);
        let config: RunConfig = cli.into();
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
