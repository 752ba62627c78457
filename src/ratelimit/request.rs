//! Accessors for the parts of an inbound request the limiter needs.

use std::net::{IpAddr, SocketAddr};

use http::HeaderMap;

/// What the admission gate reads from an inbound request.
pub trait InboundRequest {
    /// Value of a header, if present and valid UTF-8.
    fn header(&self, name: &str) -> Option<&str>;

    /// Address of the transport-level peer.
    fn peer_addr(&self) -> Option<IpAddr>;
}

/// Borrowed headers plus the peer address, for callers that hold them apart.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    headers: &'a HeaderMap,
    peer: Option<IpAddr>,
}

impl<'a> RequestParts<'a> {
    pub fn new(headers: &'a HeaderMap, peer: Option<IpAddr>) -> Self {
        Self { headers, peer }
    }
}

impl InboundRequest for RequestParts<'_> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        self.peer
    }
}

/// The peer address is read from the request extensions, where servers
/// conventionally store the accepted connection's `SocketAddr`.
impl<B> InboundRequest for http::Request<B> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        self.extensions()
            .get::<SocketAddr>()
            .map(SocketAddr::ip)
            .or_else(|| self.extensions().get::<IpAddr>().copied())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_http_request_peer_from_extensions() {
        let mut request = http::Request::builder()
            .header("x-forwarded-for", "203.0.113.9")
            .body(())
            .unwrap();
        assert_eq!(request.peer_addr(), None);

        let addr: SocketAddr = "192.0.2.10:52100".parse().unwrap();
        request.extensions_mut().insert(addr);

        assert_eq!(request.peer_addr(), Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))));
        assert_eq!(request.header("x-forwarded-for"), Some("203.0.113.9"));
        assert_eq!(request.header("missing"), None);
    }
}
