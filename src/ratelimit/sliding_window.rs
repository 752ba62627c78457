//! Sliding window log limiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::{Algorithm, LimiterConfig};
use crate::error::Result;
use crate::storage::{MemoryStorage, SharedStorage, StorageResult};

use super::clock::{Clock, SystemClock};
use super::identity::ClientIdentity;
use super::key::{make_key, LimiterKey, LimiterName};
use super::limiter::{CleanupReport, Decision, Limiter, RateLimitTelemetry, WindowOptions};
use super::locks::{KeyGuard, KeyLocks};

/// Timestamps (ms) of the admitted requests of one client, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlidingWindowLog(Vec<i64>);

impl SlidingWindowLog {
    pub fn new(timestamps: Vec<i64>) -> Self {
        Self(timestamps)
    }

    /// Keep only timestamps strictly after `window_start`.
    pub fn prune(mut self, window_start: i64) -> Self {
        self.0.retain(|&ts| ts > window_start);
        self
    }

    pub fn push(&mut self, timestamp: i64) {
        self.0.push(timestamp);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.0
    }
}

/// Admits a request when fewer than `max_requests` admitted requests fall in
/// the trailing window ending now.
///
/// Expired timestamps are pruned before the decision is made. Every check,
/// admitted or not, reports the limit and the quota left after it.
pub struct SlidingWindowLogLimiter {
    name: LimiterName,
    options: WindowOptions,
    storage: SharedStorage<SlidingWindowLog>,
    clock: Arc<dyn Clock>,
    locks: Option<Arc<KeyLocks>>,
    cleanup_on_admit: bool,
    cleanup_in_flight: Arc<AtomicBool>,
}

impl SlidingWindowLogLimiter {
    /// Create a limiter with its own in-memory store and the system clock.
    ///
    /// Cleanup after admission is enabled.
    pub fn new(name: LimiterName, options: WindowOptions) -> Self {
        Self {
            name,
            options,
            storage: Arc::new(MemoryStorage::new()),
            clock: Arc::new(SystemClock),
            locks: None,
            cleanup_on_admit: true,
            cleanup_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a limiter from validated configuration.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        let name = config.validate()?;
        Ok(Self::new(name, config.options())
            .cleanup_on_admit(config.cleanup_on_admit)
            .serialize_per_key(config.serialize_per_key))
    }

    /// Use `storage` instead of the private in-memory store.
    pub fn with_storage(mut self, storage: SharedStorage<SlidingWindowLog>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn a background sweep of the store after every admitted request.
    ///
    /// At most one such sweep runs at a time; admissions while it runs do
    /// not queue another.
    pub fn cleanup_on_admit(mut self, enabled: bool) -> Self {
        self.cleanup_on_admit = enabled;
        self
    }

    /// Serialize checks for the same key so concurrent requests cannot both
    /// observe a log below the limit.
    pub fn serialize_per_key(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(|| Arc::new(KeyLocks::new()));
        self
    }

    /// The store holding this limiter's logs.
    pub fn storage(&self) -> &SharedStorage<SlidingWindowLog> {
        &self.storage
    }

    fn sweeper(&self) -> LogSweeper {
        LogSweeper {
            name: self.name.clone(),
            window: self.options.window_delta(),
            storage: self.storage.clone(),
            clock: self.clock.clone(),
            locks: self.locks.clone(),
        }
    }

    fn spawn_cleanup(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        if self.cleanup_in_flight.swap(true, Ordering::AcqRel) {
            return;
        }

        let in_flight = InFlight(self.cleanup_in_flight.clone());
        let sweeper = self.sweeper();
        handle.spawn(async move {
            let _in_flight = in_flight;
            if let Err(e) = sweeper.run().await {
                warn!(limiter = %sweeper.name, error = %e, "Sliding window cleanup failed");
            }
        });
    }
}

#[async_trait]
impl Limiter for SlidingWindowLogLimiter {
    fn name(&self) -> &LimiterName {
        &self.name
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindowLog
    }

    fn options(&self) -> WindowOptions {
        self.options
    }

    async fn check(&self, identity: &ClientIdentity) -> StorageResult<Decision> {
        let key = make_key(identity, &self.name);
        let storage_key = key.to_storage_key();
        let _guard = lock(self.locks.as_deref(), &storage_key).await;

        let now = self.clock.now_ms();
        let window_start = now.saturating_sub(self.options.window_delta());

        let mut log = self
            .storage
            .get(&storage_key)
            .await?
            .unwrap_or_default()
            .prune(window_start);

        let max = self.options.max_requests;
        let in_window = log.len() as u64;
        let telemetry = RateLimitTelemetry {
            limit: max,
            remaining: max.saturating_sub(in_window).saturating_sub(1),
        };

        trace!(key = %key, in_window = in_window, limit = max, "Checking sliding window limit");

        if in_window >= max {
            self.storage.set(&storage_key, log).await?;
            debug!(key = %key, in_window = in_window, limit = max, "Rate limit exceeded");
            return Ok(Decision::rejected(Some(telemetry)));
        }

        log.push(now);
        self.storage.set(&storage_key, log).await?;

        if self.cleanup_on_admit {
            self.spawn_cleanup();
        }

        Ok(Decision::allowed(Some(telemetry)))
    }

    async fn cleanup(&self) -> StorageResult<CleanupReport> {
        self.sweeper().run().await
    }
}

async fn lock<'a>(locks: Option<&'a KeyLocks>, key: &str) -> Option<KeyGuard<'a>> {
    match locks {
        Some(locks) => Some(locks.acquire(key).await),
        None => None,
    }
}

/// Clears the in-flight flag when the background sweep ends, even if it is
/// cancelled.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything a cleanup pass needs, detached from the limiter so it can run
/// on a spawned task.
struct LogSweeper {
    name: LimiterName,
    window: i64,
    storage: SharedStorage<SlidingWindowLog>,
    clock: Arc<dyn Clock>,
    locks: Option<Arc<KeyLocks>>,
}

impl LogSweeper {
    async fn run(&self) -> StorageResult<CleanupReport> {
        let mut report = CleanupReport::default();

        for storage_key in self.storage.keys().await? {
            let owned = matches!(
                LimiterKey::split_storage_key(&storage_key),
                Some((name, _)) if name == self.name.as_str()
            );
            if !owned {
                continue;
            }
            report.scanned += 1;

            let _guard = lock(self.locks.as_deref(), &storage_key).await;
            let window_start = self.clock.now_ms().saturating_sub(self.window);
            let Some(log) = self.storage.get(&storage_key).await? else {
                continue;
            };

            let before = log.len();
            let log = log.prune(window_start);

            if log.is_empty() {
                self.storage.remove(&storage_key).await?;
                report.removed += 1;
            } else if log.len() < before {
                self.storage.set(&storage_key, log).await?;
                report.pruned += 1;
            }
        }

        trace!(
            limiter = %self.name,
            removed = report.removed,
            pruned = report.pruned,
            "Sliding window cleanup finished"
        );
        Ok(report)
    }
}
