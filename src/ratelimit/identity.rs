//! Client identity derived from the request's network address.

use std::fmt;

use tracing::trace;

use super::request::InboundRequest;

/// Header set by reverse proxies with the originating client address first.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

const IPV6_LOOPBACK: &str = "::1";
const IPV4_LOOPBACK: &str = "127.0.0.1";
const IPV4_MAPPED_PREFIX: &str = "::ffff:";

/// A normalized client address used as the counting identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// The normalized address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a raw address string.
///
/// `::1` becomes `127.0.0.1`, IPv4-mapped IPv6 (`::ffff:a.b.c.d`) is
/// unwrapped to the embedded IPv4 address, anything else is kept as is.
/// `None` stays `None`.
pub fn determine_ip(raw: Option<&str>) -> Option<ClientIdentity> {
    let ip = raw?;

    if ip == IPV6_LOOPBACK {
        return Some(ClientIdentity(IPV4_LOOPBACK.to_string()));
    }

    if let Some(v4) = ip.strip_prefix(IPV4_MAPPED_PREFIX) {
        return Some(ClientIdentity(v4.trim().to_string()));
    }

    Some(ClientIdentity(ip.to_string()))
}

/// Resolves the [`ClientIdentity`] of an inbound request.
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver {
    trust_forwarded_for: bool,
}

impl IdentityResolver {
    /// Create a resolver. With `trust_forwarded_for` the first entry of
    /// `x-forwarded-for` wins over the transport peer address.
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    /// Resolve the client identity, or `None` when no address is available.
    pub fn resolve<R: InboundRequest + ?Sized>(&self, request: &R) -> Option<ClientIdentity> {
        let forwarded = if self.trust_forwarded_for {
            request
                .header(FORWARDED_FOR_HEADER)
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|first| !first.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        let raw = forwarded.or_else(|| request.peer_addr().map(|addr| addr.to_string()));
        let identity = determine_ip(raw.as_deref());

        trace!(identity = ?identity, "Resolved client identity");
        identity
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(true)
    }
}
