//! Process entry point: parse CLI, wire up logging and safety checks, run
//! the scheduler, then print a final reconciliation summary.

use clap::Parser;
use jxl_archiver::cancellation::CancellationToken;
use jxl_archiver::cli::{Cli, RunConfig};
use jxl_archiver::scheduler::{self, RunOptions};
use shared_utils::{init_logging, LogConfig};
use tracing::Level;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config: RunConfig = cli.into();

    let log_dir = config
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("jxl_archiver"));
    let level = match config.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    init_logging("jxl_archiver", LogConfig::new().with_log_dir(log_dir).with_level(level))?;

    shared_utils::check_dangerous_directory(&config.root).map_err(anyhow::Error::msg)?;
    shared_utils::check_safe_for_destructive(&config.root, "convert").map_err(anyhow::Error::msg)?;

    let cancellation = CancellationToken::new();
    cancellation.install_signal_handler();

    let options = RunOptions {
        root: config.root.clone(),
        workers: config.workers,
        verify: config.verify,
        copy: config.copy,
        sample: config.sample,
        dry_run: config.dry_run,
        skip_existing: config.skip_exist,
        timeout: config.timeout,
        retries: config.retries,
        encoder_threads: config.encoder_threads,
    };

    let report = scheduler::run(options, cancellation)?;
    let snapshot = report.stats.snapshot();

    println!("processed:             {}", snapshot.images_processed);
    println!("skipped:               {}", snapshot.skipped);
    println!("plan failures:         {}", snapshot.plan_failures);
    println!("timeouts:              {}", snapshot.timeouts);
    println!("verification failures: {}", snapshot.verification_failures);
    println!("metadata warnings:     {}", snapshot.metadata_warnings);
    println!("filesystem fatal:      {}", snapshot.filesystem_fatal);
    println!("aborted:               {}", snapshot.aborted);
    println!("bytes before:          {}", snapshot.bytes_before);
    println!("bytes after:           {}", snapshot.bytes_after);

    if snapshot.filesystem_fatal > 0 {
        anyhow::bail!("{} job(s) hit an unrecoverable filesystem error", snapshot.filesystem_fatal);
    }

    shared_utils::flush_logs();
    Ok(())
}
