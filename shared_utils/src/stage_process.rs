//! Generic wrapper for running an external stage tool (cjxl, avifenc,
//! ffmpeg, heif-convert, exiftool, ...) as a child process.
//!
//! OS pipe buffers are typically 64KB. If a tool writes a lot to stderr
//! while only stdout is being read, stderr fills up, the child blocks on
//! write, and the parent blocks on read — deadlock. A dedicated thread
//! drains stderr concurrently so this can't happen regardless of which
//! tool is invoked.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// A spawned stage tool with its stderr being drained in the background.
pub struct StageProcess {
    child: Child,
    stderr_thread: Option<JoinHandle<String>>,
    started_at: Instant,
}

/// Captured result of running a stage tool to completion.
#[derive(Debug, Clone)]
pub struct StageProcessOutput {
    pub status: ExitStatus,
    pub stderr: String,
    pub duration: Duration,
}

impl StageProcess {
    /// Spawn `cmd`, wiring stdout/stderr to pipes and draining stderr on a
    /// background thread.
    pub fn spawn(cmd: &mut Command) -> Result<Self> {
        let command_str = format!("{:?}", cmd);
        info!(command = %command_str, "spawning stage process");

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = cmd.spawn().context("failed to spawn stage process")?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture stage process stderr"))?;

        let stderr_thread = thread::spawn(move || {
            let mut buf = String::new();
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        Ok(Self {
            child,
            stderr_thread: Some(stderr_thread),
            started_at: Instant::now(),
        })
    }

    /// Block until the process exits, returning its status, drained
    /// stderr, and wall-clock duration since spawn.
    pub fn wait(mut self) -> Result<StageProcessOutput> {
        let status = self.child.wait().context("failed to wait for stage process")?;
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        let duration = self.started_at.elapsed();

        if status.success() {
            info!(exit_code = status.code(), ?duration, "stage process completed");
            debug!(stderr = %stderr, "stage process stderr");
        } else {
            error!(exit_code = status.code(), stderr = %stderr, "stage process failed");
        }

        Ok(StageProcessOutput {
            status,
            stderr,
            duration,
        })
    }

    /// Non-blocking poll of whether the process has exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().context("failed to poll stage process")
    }

    /// Forcibly terminate the process (used by the cancellation/timeout path).
    pub fn kill(&mut self) -> Result<()> {
        self.child.kill().context("failed to kill stage process")
    }
}

/// Pull the most useful single line out of a tool's stderr for display:
/// prefer a line mentioning "error"/"Error", else the last non-empty line.
pub fn format_stage_error(stderr: &str) -> String {
    if let Some(line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return line.trim().to_string();
    }
    stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown stage process error".to_string())
}
