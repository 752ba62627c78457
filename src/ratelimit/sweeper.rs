//! Background eviction of expired limiter state.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::limiter::Limiter;

/// Shortest period the background task will sweep at.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Totals of one sweep across all registered limiters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Limiters whose cleanup completed
    pub succeeded: usize,
    /// Limiters whose cleanup failed
    pub failed: usize,
    /// Keys removed
    pub removed: usize,
    /// Keys rewritten with expired entries dropped
    pub pruned: usize,
}

/// Runs [`Limiter::cleanup`] for a set of limiters, on demand or on an
/// interval.
///
/// Cleanup is housekeeping only: failures are logged and never surface to
/// request handling.
#[derive(Clone)]
pub struct CleanupSweeper {
    limiters: Vec<Arc<dyn Limiter>>,
    interval: Duration,
}

impl CleanupSweeper {
    pub fn new(interval: Duration) -> Self {
        Self {
            limiters: Vec::new(),
            interval,
        }
    }

    /// Register a limiter.
    pub fn add(&mut self, limiter: Arc<dyn Limiter>) {
        self.limiters.push(limiter);
    }

    pub fn with_limiters<I>(mut self, limiters: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Limiter>>,
    {
        self.limiters.extend(limiters);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweep every registered limiter once, concurrently.
    pub async fn sweep_once(&self) -> SweepSummary {
        let results = join_all(self.limiters.iter().map(|limiter| async move {
            (limiter.name().clone(), limiter.cleanup().await)
        }))
        .await;

        let mut summary = SweepSummary::default();
        for (name, result) in results {
            match result {
                Ok(report) => {
                    summary.succeeded += 1;
                    summary.removed += report.removed;
                    summary.pruned += report.pruned;
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(limiter = %name, error = %e, "Limiter cleanup failed");
                }
            }
        }

        debug!(
            removed = summary.removed,
            pruned = summary.pruned,
            failed = summary.failed,
            "Cleanup sweep finished"
        );
        summary
    }

    /// Sweep on a fixed interval until the returned handle is shut down.
    ///
    /// A zero interval is raised to one millisecond. Must be called from
    /// within a tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let period = self.interval.max(MIN_SWEEP_INTERVAL);

        let task = tokio::spawn(async move {
            info!(
                interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
                limiters = self.limiters.len(),
                "Cleanup sweeper started"
            );

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }

            info!("Cleanup sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Cleanup sweeper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
