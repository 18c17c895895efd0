//! Cancellation token wired to Ctrl-C, plus per-job deadline computation.
//!
//! A single process-wide flag is checked by the scheduler between jobs
//! and by the stage runner's poll loop; it never interrupts a stage
//! mid-syscall, it just stops new work from starting and lets in-flight
//! stages hit their own timeout or finish naturally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Install a Ctrl-C handler that cancels this token. Best-effort: if a
    /// handler is already installed elsewhere in the process, the error is
    /// logged and the run continues uncancellable-by-signal.
    pub fn install_signal_handler(&self) {
        let token = self.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            tracing::warn!("received interrupt signal, cancelling remaining jobs");
            token.cancel();
        }) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the absolute deadline for one job given the configured
/// per-stage timeout.
pub fn job_deadline(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn deadline_is_in_the_future() {
        let deadline = job_deadline(Duration::from_secs(5));
        assert!(deadline > Instant::now());
    }
}
