//! Key-value storage contract used by every limiter algorithm.
//!
//! Limiters only ever talk to a [`Storage`] trait object, so the same
//! algorithm runs unchanged over an in-process map, a named region of a
//! shared map, or a durable table.

mod kv_table;
mod memory;
mod prefixed;
mod timeout;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use kv_table::{KvRow, KvTable, KvTableStorage, MemoryKvTable};
pub use memory::MemoryStorage;
pub use prefixed::PrefixedStorage;
pub use timeout::TimeoutStorage;

/// Errors raised by a backing store.
///
/// A missing key is never an error; it reads as `None`.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The call did not complete within the configured bound
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend could not be reached or rejected the operation
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A value could not be encoded for the backend
    #[error("storage codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Asynchronous key-value store with string keys.
///
/// Writes are last-write-wins. Removing a key that does not exist is a no-op.
/// `keys` returns a snapshot that contains at least every entry present
/// before the call started.
#[async_trait]
pub trait Storage<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Read the value stored under `key`, or `None` if there is none.
    async fn get(&self, key: &str) -> StorageResult<Option<V>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: V) -> StorageResult<()>;

    /// Remove `key` if present.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// List every key currently stored.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Whether a value is stored under `key`.
    async fn has(&self, key: &str) -> StorageResult<bool>;
}

/// A storage backend shared between limiters and background tasks.
pub type SharedStorage<V> = Arc<dyn Storage<V>>;
