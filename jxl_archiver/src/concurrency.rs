//! Concurrency budget: a fixed-size worker pool layered with two
//! independent counting semaphores.
//!
//! - The worker pool itself bounds how many jobs run at once:
//!   `min(cores, user override, 16)`.
//! - `process_permits` additionally bounds how many external tool
//!   processes may be spawned concurrently (2-4, typically
//!   `floor(cores / 2)`), since a worker can be waiting on I/O without
//!   actually running a subprocess.
//! - `fd_permits` bounds concurrent open file descriptors at `2 *
//!   process_permits`, covering the source+destination handles a stage
//!   typically holds open at once.
//!
//! No async runtime is in this dependency stack, so the semaphore is a
//! small hand-rolled `Mutex`+`Condvar` counter rather than a crate.

use std::sync::{Arc, Condvar, Mutex};

struct Inner {
    available: Mutex<usize>,
    condvar: Condvar,
}

/// A simple blocking counting semaphore.
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

pub struct Permit {
    inner: Arc<Inner>,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                available: Mutex::new(permits),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) -> Permit {
        let mut available = self.inner.available.lock().unwrap_or_else(|e| e.into_inner());
        while *available == 0 {
            available = self
                .inner
                .condvar
                .wait(available)
                .unwrap_or_else(|e| e.into_inner());
        }
        *available -= 1;
        Permit { inner: self.inner.clone() }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut available = self.inner.available.lock().unwrap_or_else(|e| e.into_inner());
        *available += 1;
        self.inner.condvar.notify_one();
    }
}

/// Resolved concurrency budget for one run.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyBudget {
    pub worker_count: usize,
    pub process_permits: usize,
    pub fd_permits: usize,
}

/// Compute the budget from the detected core count and an optional user
/// override for worker count.
pub fn compute_budget(cores: usize, user_workers: Option<usize>) -> ConcurrencyBudget {
    let worker_count = user_workers.unwrap_or(cores).clamp(1, 16).min(cores.max(1));
    let process_permits = (cores / 2).clamp(2, 4);
    let fd_permits = process_permits * 2;

    ConcurrencyBudget {
        worker_count,
        process_permits,
        fd_permits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn semaphore_limits_concurrent_holders() {
        let sem = Semaphore::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let sem = sem.clone();
                let concurrent = concurrent.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    let _permit = sem.acquire();
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn budget_respects_16_worker_cap() {
        let budget = compute_budget(64, None);
        assert_eq!(budget.worker_count, 16);
    }

    #[test]
    fn budget_respects_user_override() {
        let budget = compute_budget(16, Some(4));
        assert_eq!(budget.worker_count, 4);
    }

    #[test]
    fn process_permits_are_bounded_between_2_and_4() {
        for cores in [1usize, 2, 8, 64] {
            let budget = compute_budget(cores, None);
            assert!(budget.process_permits >= 2 && budget.process_permits <= 4);
            assert_eq!(budget.fd_permits, budget.process_permits * 2);
        }
    }
}
