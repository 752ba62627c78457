//! Latency bound around another store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{SharedStorage, Storage, StorageError, StorageResult};

/// Bounds every call on the wrapped store with `tokio::time::timeout`.
///
/// A call that does not finish in time fails with [`StorageError::Timeout`];
/// the admission gate then applies its failure policy instead of hanging.
pub struct TimeoutStorage<V> {
    inner: SharedStorage<V>,
    timeout: Duration,
}

impl<V> TimeoutStorage<V>
where
    V: Send + Sync + 'static,
{
    /// Wrap `inner`, bounding each call by `timeout`.
    pub fn new(inner: SharedStorage<V>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The configured per-call bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, call: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl<V> Storage<V> for TimeoutStorage<V>
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: V) -> StorageResult<()> {
        self.bounded(self.inner.set(key, value)).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.bounded(self.inner.remove(key)).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.bounded(self.inner.keys()).await
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        self.bounded(self.inner.has(key)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::MemoryStorage;

    /// A store whose reads never complete.
    struct HangingStorage;

    #[async_trait]
    impl Storage<u32> for HangingStorage {
        async fn get(&self, _key: &str) -> StorageResult<Option<u32>> {
            std::future::pending().await
        }

        async fn set(&self, _key: &str, _value: u32) -> StorageResult<()> {
            Ok(())
        }

        async fn remove(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn keys(&self) -> StorageResult<Vec<String>> {
            std::future::pending().await
        }

        async fn has(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_hanging_call_times_out() {
        let storage = TimeoutStorage::new(Arc::new(HangingStorage), Duration::from_millis(20));

        let err = storage.get("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout(d) if d == Duration::from_millis(20)));
        assert!(storage.keys().await.is_err());
        assert!(storage.set("k", 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let storage = TimeoutStorage::new(
            Arc::new(MemoryStorage::<u32>::new()),
            Duration::from_secs(1),
        );

        storage.set("k", 3).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), Some(3));
        assert_eq!(storage.timeout(), Duration::from_secs(1));
    }
}
