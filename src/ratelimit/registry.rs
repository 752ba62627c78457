//! Named admission gates built from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{Algorithm, RateLimitingConfig};
use crate::error::Result;
use crate::storage::{
    KvTable, KvTableStorage, MemoryStorage, PrefixedStorage, SharedStorage, TimeoutStorage,
};

use super::clock::{Clock, SystemClock};
use super::fixed_window::{FixedWindowLimiter, FixedWindowRecord};
use super::gate::AdmissionGate;
use super::identity::IdentityResolver;
use super::limiter::Limiter;
use super::sliding_window::{SlidingWindowLog, SlidingWindowLogLimiter};
use super::sweeper::CleanupSweeper;

/// Region holding fixed window records on a shared backend.
pub const FIXED_WINDOW_REGION: &str = "fixedWindowLimiter";
/// Region holding sliding window logs on a shared backend.
pub const SLIDING_WINDOW_REGION: &str = "slidingWindowLimiter";

/// One store per algorithm family, shared by every limiter of that family.
#[derive(Clone)]
pub struct Backends {
    pub fixed_window: SharedStorage<FixedWindowRecord>,
    pub sliding_window: SharedStorage<SlidingWindowLog>,
}

impl Backends {
    /// Separate in-process stores for each family.
    pub fn in_memory() -> Self {
        Self {
            fixed_window: Arc::new(MemoryStorage::new()),
            sliding_window: Arc::new(MemoryStorage::new()),
        }
    }

    /// Both families in one durable table, each under its own region.
    pub fn kv_table(table: Arc<dyn KvTable>) -> Self {
        let fixed: SharedStorage<FixedWindowRecord> = Arc::new(KvTableStorage::new(table.clone()));
        let sliding: SharedStorage<SlidingWindowLog> = Arc::new(KvTableStorage::new(table));

        Self {
            fixed_window: Arc::new(PrefixedStorage::new(fixed, FIXED_WINDOW_REGION)),
            sliding_window: Arc::new(PrefixedStorage::new(sliding, SLIDING_WINDOW_REGION)),
        }
    }

    fn with_timeout(self, config: &RateLimitingConfig) -> Self {
        match config.storage_timeout() {
            Some(timeout) => Self {
                fixed_window: Arc::new(TimeoutStorage::new(self.fixed_window, timeout)),
                sliding_window: Arc::new(TimeoutStorage::new(self.sliding_window, timeout)),
            },
            None => self,
        }
    }
}

/// Admission gates keyed by limiter name.
pub struct LimiterRegistry {
    gates: HashMap<String, Arc<AdmissionGate>>,
    order: Vec<String>,
    cleanup_interval: std::time::Duration,
}

impl LimiterRegistry {
    /// Build every configured limiter over `backends` with the system clock.
    pub fn from_config(config: &RateLimitingConfig, backends: Backends) -> Result<Self> {
        Self::with_clock(config, backends, Arc::new(SystemClock))
    }

    /// Build every configured limiter over `backends`, reading time from `clock`.
    pub fn with_clock(
        config: &RateLimitingConfig,
        backends: Backends,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let backends = backends.with_timeout(config);
        let resolver = IdentityResolver::new(config.trust_forwarded_for);
        let mut gates = HashMap::new();
        let mut order = Vec::with_capacity(config.limiters.len());

        for limiter_config in &config.limiters {
            let limiter: Arc<dyn Limiter> = match limiter_config.algorithm {
                Algorithm::FixedWindow => Arc::new(
                    FixedWindowLimiter::from_config(limiter_config)?
                        .with_storage(backends.fixed_window.clone())
                        .with_clock(clock.clone()),
                ),
                Algorithm::SlidingWindowLog => Arc::new(
                    SlidingWindowLogLimiter::from_config(limiter_config)?
                        .with_storage(backends.sliding_window.clone())
                        .with_clock(clock.clone()),
                ),
            };

            info!(
                limiter = %limiter_config.name,
                algorithm = ?limiter_config.algorithm,
                window_ms = limiter_config.window_ms,
                max_requests = limiter_config.max_requests,
                "Registered rate limiter"
            );

            let gate = AdmissionGate::new(limiter)
                .with_resolver(resolver)
                .with_failure_policy(config.failure_policy);
            gates.insert(limiter_config.name.clone(), Arc::new(gate));
            order.push(limiter_config.name.clone());
        }

        Ok(Self {
            gates,
            order,
            cleanup_interval: config.cleanup_interval(),
        })
    }

    /// The gate for limiter `name`.
    pub fn gate(&self, name: &str) -> Option<Arc<AdmissionGate>> {
        self.gates.get(name).cloned()
    }

    /// Limiter names in configuration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Every limiter, in configuration order.
    pub fn limiters(&self) -> Vec<Arc<dyn Limiter>> {
        self.order
            .iter()
            .filter_map(|name| self.gates.get(name))
            .map(|gate| gate.limiter().clone())
            .collect()
    }

    /// A sweeper over every limiter at the configured interval.
    pub fn sweeper(&self) -> CleanupSweeper {
        CleanupSweeper::new(self.cleanup_interval).with_limiters(self.limiters())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
