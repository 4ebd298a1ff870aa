//! Stop-the-world coordination for installation.
//!
//! Installation mutates live method records, so it runs while every other mutator is
//! parked at a safepoint:
//! 1. Request the pause and wait (bounded) for every mutator to park
//! 2. Clone, redirect and publish
//! 3. Resume, also when step 2 failed or panicked
//!
//! Failing to reach the safepoint within the bound is fatal: the installation is
//! abandoned before anything was mutated.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{metadata::MethodIdentity, runtime::RuntimeAdapter, Error, Result};

pub(crate) struct SafepointCoordinator {
    adapter: Arc<dyn RuntimeAdapter>,
    timeout: Duration,
    pauses: AtomicU64,
    total_pause_nanos: AtomicU64,
}

/// Resumes the world when dropped.
struct PauseGuard<'a> {
    adapter: &'a dyn RuntimeAdapter,
    start: Instant,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.adapter.resume_all() {
            warn!(%error, "failed to resume mutators");
        }
    }
}

impl SafepointCoordinator {
    pub(crate) fn new(adapter: Arc<dyn RuntimeAdapter>, timeout: Duration) -> Self {
        SafepointCoordinator {
            adapter,
            timeout,
            pauses: AtomicU64::new(0),
            total_pause_nanos: AtomicU64::new(0),
        }
    }

    /// Runs `f` with every other mutator parked.
    pub(crate) fn with_all_threads_paused<T>(
        &self,
        identity: &MethodIdentity,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let waiting = Instant::now();
        if !self.adapter.suspend_all(self.timeout)? {
            return Err(Error::InstallationFatal {
                identity: identity.clone(),
                reason: format!(
                    "mutators did not reach a safepoint within {:?}",
                    self.timeout
                ),
            });
        }

        let guard = PauseGuard {
            adapter: self.adapter.as_ref(),
            start: Instant::now(),
        };
        debug!(method = %identity, waited = ?waiting.elapsed(), "world stopped");

        let result = f();

        let paused = guard.start.elapsed();
        drop(guard);
        self.pauses.fetch_add(1, Ordering::Relaxed);
        self.total_pause_nanos.fetch_add(
            u64::try_from(paused.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        debug!(method = %identity, ?paused, "world resumed");

        result
    }

    /// Number of completed pauses.
    pub(crate) fn pauses(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }

    /// Total time spent with the world stopped.
    pub(crate) fn total_pause(&self) -> Duration {
        Duration::from_nanos(self.total_pause_nanos.load(Ordering::Relaxed))
    }
}
