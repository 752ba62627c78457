//! Limiter names and the storage keys derived from them.

use std::fmt;

use crate::error::{FloodgateError, Result};

use super::identity::ClientIdentity;

const SEPARATOR: char = ':';

/// Identifier of one rate limit policy, e.g. `get-products`.
///
/// Names are non-empty and never contain `:`, which keeps the key format
/// unambiguous even when the identity is an IPv6 address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterName(String);

impl LimiterName {
    /// Validate and wrap a limiter name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(FloodgateError::Config(
                "limiter name must not be empty".to_string(),
            ));
        }
        if name.contains(SEPARATOR) {
            return Err(FloodgateError::Config(format!(
                "limiter name '{}' must not contain '{}'",
                name, SEPARATOR
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LimiterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage key of one client under one limiter: `"{name}:{identity}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    /// The limiter this key belongs to
    pub name: LimiterName,
    /// The client being counted
    pub identity: ClientIdentity,
}

impl LimiterKey {
    /// Combine a client identity with a limiter name.
    pub fn new(identity: &ClientIdentity, name: &LimiterName) -> Self {
        Self {
            name: name.clone(),
            identity: identity.clone(),
        }
    }

    /// Serialize to the string stored in the backend.
    pub fn to_storage_key(&self) -> String {
        format!("{}{}{}", self.name, SEPARATOR, self.identity)
    }

    /// Split a stored key back into its limiter name and identity part.
    ///
    /// Returns `None` for keys not produced by [`LimiterKey::to_storage_key`].
    pub fn split_storage_key(key: &str) -> Option<(&str, &str)> {
        let (name, identity) = key.split_once(SEPARATOR)?;
        if name.is_empty() || identity.is_empty() {
            return None;
        }
        Some((name, identity))
    }
}

/// Build the storage key for `identity` under the limiter `name`.
pub fn make_key(identity: &ClientIdentity, name: &LimiterName) -> LimiterKey {
    LimiterKey::new(identity, name)
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, SEPARATOR, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::identity::determine_ip;

    fn ip(s: &str) -> ClientIdentity {
        determine_ip(Some(s)).unwrap()
    }

    #[test]
    fn test_limiter_name_validation() {
        assert!(LimiterName::new("get-products").is_ok());
        assert!(LimiterName::new("").is_err());
        assert!(LimiterName::new("a:b").is_err());
    }

    #[test]
    fn test_make_key_format() {
        let name = LimiterName::new("get-product").unwrap();
        let key = make_key(&ip("127.0.0.2"), &name);
        assert_eq!(key.to_storage_key(), "get-product:127.0.0.2");
        assert_eq!(key.to_string(), key.to_storage_key());
    }

    #[test]
    fn test_make_key_is_deterministic() {
        let name = LimiterName::new("login").unwrap();
        assert_eq!(make_key(&ip("10.0.0.1"), &name), make_key(&ip("10.0.0.1"), &name));
    }

    #[test]
    fn test_distinct_pairs_never_collide() {
        let a = LimiterName::new("a").unwrap();
        let b = LimiterName::new("b").unwrap();
        let keys = [
            make_key(&ip("2001:db8::1"), &a).to_storage_key(),
            make_key(&ip("2001:db8::1"), &b).to_storage_key(),
            make_key(&ip("10.0.0.1"), &a).to_storage_key(),
            make_key(&ip("10.0.0.1"), &b).to_storage_key(),
        ];

        for (i, x) in keys.iter().enumerate() {
            for y in keys.iter().skip(i + 1) {
                assert_ne!(x, y);
            }
        }
    }

    #[test]
    fn test_split_storage_key_with_ipv6_identity() {
        let name = LimiterName::new("search").unwrap();
        let key = make_key(&ip("2001:db8::1"), &name).to_storage_key();

        assert_eq!(
            LimiterKey::split_storage_key(&key),
            Some(("search", "2001:db8::1"))
        );
        assert_eq!(LimiterKey::split_storage_key("no-separator"), None);
    }
}
