//! Common interface of the limiter algorithms.

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::Algorithm;
use crate::storage::StorageResult;

use super::identity::ClientIdentity;
use super::key::LimiterName;

/// Header carrying the configured request limit.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
/// Header carrying the requests left in the current window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Default window size in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;
/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 50;

/// Window size and quota of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOptions {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per window, always > 0
    pub max_requests: u64,
}

impl WindowOptions {
    pub fn new(window_ms: u64, max_requests: u64) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    /// Window length as a signed millisecond delta for timestamp arithmetic.
    pub(crate) fn window_delta(&self) -> i64 {
        i64::try_from(self.window_ms).unwrap_or(i64::MAX)
    }
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS, DEFAULT_MAX_REQUESTS)
    }
}

/// Advisory quota information attached to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitTelemetry {
    pub limit: u64,
    pub remaining: u64,
}

impl RateLimitTelemetry {
    /// Write `x-ratelimit-limit` and `x-ratelimit-remaining` into `headers`.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static(LIMIT_HEADER),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static(REMAINING_HEADER),
            HeaderValue::from(self.remaining),
        );
    }
}

/// Outcome of a single limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub telemetry: Option<RateLimitTelemetry>,
}

impl Decision {
    pub fn allowed(telemetry: Option<RateLimitTelemetry>) -> Self {
        Self {
            allowed: true,
            telemetry,
        }
    }

    pub fn rejected(telemetry: Option<RateLimitTelemetry>) -> Self {
        Self {
            allowed: false,
            telemetry,
        }
    }
}

/// Counts of a cleanup pass over one limiter's keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Keys belonging to the limiter that were inspected
    pub scanned: usize,
    /// Keys removed because nothing in them was still live
    pub removed: usize,
    /// Keys rewritten with expired entries dropped
    pub pruned: usize,
}

/// A rate limiting algorithm bound to a name, a store and a clock.
///
/// Implementations own every state transition; callers only ask for a
/// decision or trigger housekeeping.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// The policy name used to namespace this limiter's keys.
    fn name(&self) -> &LimiterName;

    /// Which algorithm this limiter runs.
    fn algorithm(&self) -> Algorithm;

    /// Window size and quota.
    fn options(&self) -> WindowOptions;

    /// Count a request from `identity` and decide whether it is admitted.
    async fn check(&self, identity: &ClientIdentity) -> StorageResult<Decision>;

    /// Evict expired state belonging to this limiter.
    async fn cleanup(&self) -> StorageResult<CleanupReport>;
}
