//! Rate limiting algorithms, identity resolution and the admission gate.

mod clock;
mod fixed_window;
mod gate;
mod identity;
mod key;
mod limiter;
mod locks;
mod registry;
mod request;
mod sliding_window;
mod sweeper;

#[cfg(test)]
mod concurrency_tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fixed_window::{FixedWindowLimiter, FixedWindowRecord};
pub use gate::{Admission, AdmissionGate, Rejection, RejectionReason, TOO_MANY_REQUESTS_MESSAGE};
pub use identity::{determine_ip, ClientIdentity, IdentityResolver, FORWARDED_FOR_HEADER};
pub use key::{make_key, LimiterKey, LimiterName};
pub use limiter::{
    CleanupReport, Decision, Limiter, RateLimitTelemetry, WindowOptions, DEFAULT_MAX_REQUESTS,
    DEFAULT_WINDOW_MS, LIMIT_HEADER, REMAINING_HEADER,
};
pub use locks::{KeyGuard, KeyLocks};
pub use registry::{Backends, LimiterRegistry, FIXED_WINDOW_REGION, SLIDING_WINDOW_REGION};
pub use request::{InboundRequest, RequestParts};
pub use sliding_window::{SlidingWindowLog, SlidingWindowLogLimiter};
pub use sweeper::{CleanupSweeper, SweepSummary, SweeperHandle};
