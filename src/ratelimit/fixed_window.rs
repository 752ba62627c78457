//! Fixed window counter limiter.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{Algorithm, LimiterConfig};
use crate::error::Result;
use crate::storage::{MemoryStorage, SharedStorage, StorageResult};

use super::clock::{Clock, SystemClock};
use super::identity::ClientIdentity;
use super::key::{make_key, LimiterKey, LimiterName};
use super::limiter::{CleanupReport, Decision, Limiter, WindowOptions};
use super::locks::{KeyGuard, KeyLocks};

/// Request count of one client within its current window.
///
/// `end_time` is always `start_time + window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedWindowRecord {
    pub count: u64,
    pub start_time: i64,
    pub end_time: i64,
}

impl FixedWindowRecord {
    /// A fresh window opened by the request at `now`.
    pub fn start(now: i64, window: i64) -> Self {
        Self {
            count: 1,
            start_time: now,
            end_time: now.saturating_add(window),
        }
    }

    /// Whether more than `window` has passed since the window opened.
    pub fn is_expired(&self, now: i64, window: i64) -> bool {
        now.saturating_sub(self.start_time) > window
    }

    /// Whether the window ended strictly before `now`.
    pub fn has_ended(&self, now: i64) -> bool {
        self.end_time < now
    }
}

/// Counts requests per client in fixed windows that open on the first
/// request and reset once they expire.
///
/// A reset is a full restart rather than a slide, so a burst straddling the
/// boundary can see up to twice `max_requests` admitted in a short span.
pub struct FixedWindowLimiter {
    name: LimiterName,
    options: WindowOptions,
    storage: SharedStorage<FixedWindowRecord>,
    clock: Arc<dyn Clock>,
    locks: Option<KeyLocks>,
}

impl FixedWindowLimiter {
    /// Create a limiter with its own in-memory store and the system clock.
    pub fn new(name: LimiterName, options: WindowOptions) -> Self {
        Self {
            name,
            options,
            storage: Arc::new(MemoryStorage::new()),
            clock: Arc::new(SystemClock),
            locks: None,
        }
    }

    /// Build a limiter from validated configuration.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        let name = config.validate()?;
        Ok(Self::new(name, config.options()).serialize_per_key(config.serialize_per_key))
    }

    /// Use `storage` instead of the private in-memory store.
    pub fn with_storage(mut self, storage: SharedStorage<FixedWindowRecord>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serialize checks for the same key so concurrent requests cannot both
    /// observe a count below the limit.
    pub fn serialize_per_key(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(KeyLocks::new);
        self
    }

    /// The store holding this limiter's records.
    pub fn storage(&self) -> &SharedStorage<FixedWindowRecord> {
        &self.storage
    }

    async fn lock(&self, key: &str) -> Option<KeyGuard<'_>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(key).await),
            None => None,
        }
    }

    fn owns(&self, storage_key: &str) -> bool {
        matches!(
            LimiterKey::split_storage_key(storage_key),
            Some((name, _)) if name == self.name.as_str()
        )
    }
}

#[async_trait]
impl Limiter for FixedWindowLimiter {
    fn name(&self) -> &LimiterName {
        &self.name
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }

    fn options(&self) -> WindowOptions {
        self.options
    }

    async fn check(&self, identity: &ClientIdentity) -> StorageResult<Decision> {
        let key = make_key(identity, &self.name);
        let storage_key = key.to_storage_key();
        let _guard = self.lock(&storage_key).await;

        let now = self.clock.now_ms();
        let window = self.options.window_delta();

        trace!(key = %key, now = now, "Checking fixed window limit");

        match self.storage.get(&storage_key).await? {
            Some(mut record) if !record.is_expired(now, window) => {
                if record.count < self.options.max_requests {
                    record.count += 1;
                    self.storage.set(&storage_key, record).await?;
                    return Ok(Decision::allowed(None));
                }

                debug!(
                    key = %key,
                    count = record.count,
                    limit = self.options.max_requests,
                    "Rate limit exceeded"
                );
                Ok(Decision::rejected(None))
            }
            previous => {
                debug!(
                    key = %key,
                    expired = previous.is_some(),
                    window_ms = self.options.window_ms,
                    "Starting new fixed window"
                );
                self.storage
                    .set(&storage_key, FixedWindowRecord::start(now, window))
                    .await?;
                Ok(Decision::allowed(None))
            }
        }
    }

    async fn cleanup(&self) -> StorageResult<CleanupReport> {
        let mut report = CleanupReport::default();

        for storage_key in self.storage.keys().await? {
            if !self.owns(&storage_key) {
                continue;
            }
            report.scanned += 1;

            let _guard = self.lock(&storage_key).await;
            let now = self.clock.now_ms();
            let Some(record) = self.storage.get(&storage_key).await? else {
                continue;
            };

            if record.has_ended(now) {
                self.storage.remove(&storage_key).await?;
                report.removed += 1;
            }
        }

        trace!(limiter = %self.name, removed = report.removed, "Fixed window cleanup finished");
        Ok(report)
    }
}
