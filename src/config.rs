//! Configuration management for Floodgate.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{LimiterName, WindowOptions, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS};

/// Rate limiting algorithm of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Counter reset at fixed time-bucket boundaries
    FixedWindow,
    /// Timestamp log counted over a trailing window
    #[default]
    SlidingWindowLog,
}

/// What the admission gate does when the backing store fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request
    #[default]
    Open,
    /// Reject the request as unavailable
    Closed,
}

/// Top-level rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Bound on each storage call in milliseconds (0 disables the bound)
    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_ms: u64,

    /// Interval of the background cleanup sweeper in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Whether `x-forwarded-for` is trusted for client identity
    #[serde(default = "default_trust_forwarded_for")]
    pub trust_forwarded_for: bool,

    /// Behaviour when the backing store fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Named limiter policies
    #[serde(default)]
    pub limiters: Vec<LimiterConfig>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            storage_timeout_ms: default_storage_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            trust_forwarded_for: default_trust_forwarded_for(),
            failure_policy: FailurePolicy::default(),
            limiters: Vec::new(),
        }
    }
}

fn default_storage_timeout() -> u64 {
    250
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_trust_forwarded_for() -> bool {
    true
}

/// Configuration of a single named limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Policy name, unique among limiters sharing a backend
    pub name: String,

    /// Algorithm to run
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Window size in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Sweep the sliding window store after each admitted request
    #[serde(default = "default_cleanup_on_admit")]
    pub cleanup_on_admit: bool,

    /// Serialize checks for the same client so concurrent requests never over-admit
    #[serde(default)]
    pub serialize_per_key: bool,
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_max_requests() -> u64 {
    DEFAULT_MAX_REQUESTS
}

fn default_cleanup_on_admit() -> bool {
    true
}

impl LimiterConfig {
    /// A limiter with default settings.
    pub fn new(name: impl Into<String>, algorithm: Algorithm) -> Self {
        Self {
            name: name.into(),
            algorithm,
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            cleanup_on_admit: default_cleanup_on_admit(),
            serialize_per_key: false,
        }
    }

    /// Set window size and quota.
    pub fn with_window(mut self, window_ms: u64, max_requests: u64) -> Self {
        self.window_ms = window_ms;
        self.max_requests = max_requests;
        self
    }

    /// Validate the settings and return the limiter name.
    pub fn validate(&self) -> Result<LimiterName> {
        let name = LimiterName::new(self.name.clone())?;

        if self.window_ms == 0 {
            return Err(FloodgateError::Config(format!(
                "limiter '{}': window_ms must be greater than 0",
                self.name
            )));
        }
        if self.max_requests == 0 {
            return Err(FloodgateError::Config(format!(
                "limiter '{}': max_requests must be greater than 0",
                self.name
            )));
        }

        Ok(name)
    }

    /// Window size and quota of this limiter.
    pub fn options(&self) -> WindowOptions {
        WindowOptions::new(self.window_ms, self.max_requests)
    }
}

impl RateLimitingConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limiting configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RateLimitingConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the sweeper interval and every limiter, rejecting duplicate names.
    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval_secs == 0 {
            return Err(FloodgateError::Config(
                "cleanup_interval_secs must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for limiter in &self.limiters {
            let name = limiter.validate()?;
            if !seen.insert(name) {
                return Err(FloodgateError::Config(format!(
                    "duplicate limiter name '{}'",
                    limiter.name
                )));
            }
        }
        Ok(())
    }

    /// Per-call storage bound, or `None` when disabled.
    pub fn storage_timeout(&self) -> Option<Duration> {
        (self.storage_timeout_ms > 0).then(|| Duration::from_millis(self.storage_timeout_ms))
    }

    /// Period of the background sweeper.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
