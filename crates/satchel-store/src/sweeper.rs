//! Periodic removal of expired session rows.
//!
//! The sweeper is a single Tokio task that calls
//! [`SessionStore::cleanup_expired`] on a fixed interval. A sweep is awaited
//! before the next tick is taken and missed ticks are skipped, so at most one
//! sweep is ever in flight. Failed sweeps are logged and retried on the next
//! tick; they never stop the task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::SessionStore;

/// Counters accumulated by a running sweeper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Sweeps attempted, successful or not.
    pub runs: u64,
    /// Sweeps that returned an error.
    pub failures: u64,
    /// Rows removed across all successful sweeps.
    pub removed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    runs: AtomicU64,
    failures: AtomicU64,
    removed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SweepStats {
        SweepStats {
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
        }
    }
}

/// Runs [`SessionStore::cleanup_expired`] on a fixed schedule.
#[derive(Debug, Clone)]
pub struct ExpirationSweeper {
    store: SessionStore,
    interval: Duration,
}

impl ExpirationSweeper {
    /// Create a sweeper for `store` that fires every `interval`.
    pub fn new(store: SessionStore, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::InvalidArgument(
                "sweep interval must be positive".to_string(),
            ));
        }
        Ok(Self { store, interval })
    }

    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweep once, returning the number of rows removed.
    pub async fn run_once(&self) -> Result<usize> {
        self.store.cleanup_expired().await
    }

    /// Start sweeping in the background. The first sweep runs immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let interval_secs = self.interval.as_secs_f64();
        let task = tokio::spawn(self.run(cancel.clone(), Arc::clone(&counters)));
        info!(interval_secs, "Expiration sweeper started");

        SweeperHandle {
            cancel,
            task: Some(task),
            counters,
        }
    }

    async fn run(self, cancel: CancellationToken, counters: Arc<Counters>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            let result = self.run_once().await;
            counters.runs.fetch_add(1, Ordering::Relaxed);

            match result {
                Ok(removed) => {
                    counters.removed.fetch_add(removed as u64, Ordering::Relaxed);
                    debug!(
                        count = removed,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Sweep complete"
                    );
                }
                Err(e) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Sweep failed, retrying on next tick");
                }
            }
        }

        info!("Expiration sweeper stopped");
    }
}

/// Handle to a running [`ExpirationSweeper`].
///
/// Dropping the handle stops the sweeper after any in-flight sweep.
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl SweeperHandle {
    /// Counters so far.
    pub fn stats(&self) -> SweepStats {
        self.counters.snapshot()
    }

    /// Whether the sweeper task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the sweeper and wait for it to exit. Returns the final counters.
    pub async fn shutdown(mut self) -> SweepStats {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Expiration sweeper task ended abnormally");
        }
        self.counters.snapshot()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
