//! Per-request entry point of the rate limiter.

use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use tracing::{debug, instrument, warn};

use crate::config::FailurePolicy;

use super::identity::{ClientIdentity, IdentityResolver};
use super::limiter::{Limiter, RateLimitTelemetry};
use super::request::InboundRequest;

/// Message returned to clients that exceeded their quota.
pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests. Please try again later.";
const STORAGE_UNAVAILABLE_MESSAGE: &str = "Rate limiting is temporarily unavailable.";

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The client exhausted its quota
    TooManyRequests,
    /// The store failed and the gate is configured to fail closed
    StorageUnavailable,
}

/// A rejected admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub message: String,
    pub telemetry: Option<RateLimitTelemetry>,
}

impl Rejection {
    fn too_many_requests(telemetry: Option<RateLimitTelemetry>) -> Self {
        Self {
            reason: RejectionReason::TooManyRequests,
            message: TOO_MANY_REQUESTS_MESSAGE.to_string(),
            telemetry,
        }
    }

    fn storage_unavailable() -> Self {
        Self {
            reason: RejectionReason::StorageUnavailable,
            message: STORAGE_UNAVAILABLE_MESSAGE.to_string(),
            telemetry: None,
        }
    }

    /// HTTP status the caller should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self.reason {
            RejectionReason::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            RejectionReason::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Result of passing a request through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed {
        telemetry: Option<RateLimitTelemetry>,
    },
    Rejected(Rejection),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }

    /// Quota information to attach to the response, if the limiter reports any.
    pub fn telemetry(&self) -> Option<RateLimitTelemetry> {
        match self {
            Admission::Allowed { telemetry } => *telemetry,
            Admission::Rejected(rejection) => rejection.telemetry,
        }
    }

    /// Write the quota headers, if any, into an outbound header map.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        if let Some(telemetry) = self.telemetry() {
            telemetry.write_headers(headers);
        }
    }
}

/// Resolves the client, asks one limiter for a decision and turns it into an
/// [`Admission`].
///
/// The gate never touches limiter state. Requests without a resolvable
/// client address are always admitted.
pub struct AdmissionGate {
    limiter: Arc<dyn Limiter>,
    resolver: IdentityResolver,
    failure_policy: FailurePolicy,
}

impl AdmissionGate {
    /// Gate `limiter`, trusting `x-forwarded-for` and failing open.
    pub fn new(limiter: Arc<dyn Limiter>) -> Self {
        Self {
            limiter,
            resolver: IdentityResolver::default(),
            failure_policy: FailurePolicy::Open,
        }
    }

    pub fn with_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// The limiter behind this gate.
    pub fn limiter(&self) -> &Arc<dyn Limiter> {
        &self.limiter
    }

    /// Decide whether `request` may proceed.
    pub async fn check<R: InboundRequest + ?Sized>(&self, request: &R) -> Admission {
        match self.resolver.resolve(request) {
            Some(identity) => self.check_identity(&identity).await,
            None => {
                debug!(limiter = %self.limiter.name(), "No client address, skipping rate limit");
                Admission::Allowed { telemetry: None }
            }
        }
    }

    /// Decide for an already resolved client.
    #[instrument(skip(self), fields(limiter = %self.limiter.name()))]
    pub async fn check_identity(&self, identity: &ClientIdentity) -> Admission {
        match self.limiter.check(identity).await {
            Ok(decision) if decision.allowed => Admission::Allowed {
                telemetry: decision.telemetry,
            },
            Ok(decision) => Admission::Rejected(Rejection::too_many_requests(decision.telemetry)),
            Err(e) => match self.failure_policy {
                FailurePolicy::Open => {
                    warn!(identity = %identity, error = %e, "Rate limit storage failed, admitting request");
                    Admission::Allowed { telemetry: None }
                }
                FailurePolicy::Closed => {
                    warn!(identity = %identity, error = %e, "Rate limit storage failed, rejecting request");
                    Admission::Rejected(Rejection::storage_unavailable())
                }
            },
        }
    }
}
