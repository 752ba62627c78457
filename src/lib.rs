//! Floodgate - per-client request admission control
//!
//! This crate decides whether an inbound request may proceed based on how
//! many requests its client address made recently. Two interchangeable
//! algorithms (fixed window and sliding window log) run over a pluggable
//! asynchronous key-value store, and each limiter namespaces its keys by name
//! so several policies can share one backend.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod storage;

pub use config::{Algorithm, FailurePolicy, LimiterConfig, RateLimitingConfig};
pub use error::{FloodgateError, Result};
pub use ratelimit::{Admission, AdmissionGate, LimiterRegistry};
