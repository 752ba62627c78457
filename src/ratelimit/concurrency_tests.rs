//! Behaviour of concurrent checks for the same client.
//!
//! By default a check is a plain read-modify-write against the store, so two
//! requests that read before either writes can both be admitted. With
//! `serialize_per_key` the same client's checks run one at a time.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Barrier;

use super::*;
use crate::storage::{MemoryStorage, SharedStorage, Storage, StorageResult};

/// Wraps a store and yields to the scheduler around every call.
struct YieldingStorage<V> {
    inner: MemoryStorage<V>,
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> Storage<V> for YieldingStorage<V> {
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        tokio::task::yield_now().await;
        let value = self.inner.get(key).await;
        tokio::task::yield_now().await;
        value
    }

    async fn set(&self, key: &str, value: V) -> StorageResult<()> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys().await
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        self.inner.has(key).await
    }
}

/// Holds every read until two readers have arrived.
struct PairedReadStorage<V> {
    inner: MemoryStorage<V>,
    barrier: Barrier,
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> Storage<V> for PairedReadStorage<V> {
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        let value = self.inner.get(key).await;
        self.barrier.wait().await;
        value
    }

    async fn set(&self, key: &str, value: V) -> StorageResult<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys().await
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        self.inner.has(key).await
    }
}

fn yielding<V: Clone + Send + Sync + 'static>() -> SharedStorage<V> {
    Arc::new(YieldingStorage {
        inner: MemoryStorage::new(),
    })
}

fn paired<V: Clone + Send + Sync + 'static>() -> SharedStorage<V> {
    Arc::new(PairedReadStorage {
        inner: MemoryStorage::new(),
        barrier: Barrier::new(2),
    })
}

fn client() -> ClientIdentity {
    determine_ip(Some("198.51.100.20")).unwrap()
}

async fn admitted_concurrently(limiter: Arc<dyn Limiter>, requests: usize) -> usize {
    let identity = client();
    let tasks = (0..requests).map(|_| {
        let limiter = limiter.clone();
        let identity = identity.clone();
        tokio::spawn(async move { limiter.check(&identity).await.unwrap().allowed })
    });

    join_all(tasks)
        .await
        .into_iter()
        .filter(|result| matches!(result, Ok(true)))
        .count()
}

#[tokio::test]
async fn test_relaxed_fixed_window_can_over_admit() {
    let limiter = FixedWindowLimiter::new(LimiterName::new("api").unwrap(), WindowOptions::new(60_000, 1))
        .with_storage(paired());
    let identity = client();

    let (a, b) = tokio::join!(limiter.check(&identity), limiter.check(&identity));
    assert!(a.unwrap().allowed);
    assert!(b.unwrap().allowed);
}

#[tokio::test]
async fn test_relaxed_sliding_window_can_over_admit() {
    let limiter = SlidingWindowLogLimiter::new(LimiterName::new("api").unwrap(), WindowOptions::new(60_000, 1))
        .with_storage(paired())
        .cleanup_on_admit(false);
    let identity = client();

    let (a, b) = tokio::join!(limiter.check(&identity), limiter.check(&identity));
    assert!(a.unwrap().allowed);
    assert!(b.unwrap().allowed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_relaxed_over_admission_is_bounded_by_concurrency() {
    let limiter = SlidingWindowLogLimiter::new(LimiterName::new("api").unwrap(), WindowOptions::new(60_000, 4))
        .with_storage(yielding())
        .cleanup_on_admit(false);

    let admitted = admitted_concurrently(Arc::new(limiter), 16).await;
    assert!(admitted >= 4);
    assert!(admitted <= 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serialized_fixed_window_never_over_admits() {
    let limiter = FixedWindowLimiter::new(LimiterName::new("api").unwrap(), WindowOptions::new(60_000, 4))
        .with_storage(yielding())
        .serialize_per_key(true);

    assert_eq!(admitted_concurrently(Arc::new(limiter), 16).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serialized_sliding_window_never_over_admits() {
    let limiter = SlidingWindowLogLimiter::new(LimiterName::new("api").unwrap(), WindowOptions::new(60_000, 4))
        .with_storage(yielding())
        .serialize_per_key(true);

    assert_eq!(admitted_concurrently(Arc::new(limiter), 16).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serialized_clients_proceed_independently() {
    let limiter: Arc<dyn Limiter> = Arc::new(
        FixedWindowLimiter::new(LimiterName::new("api").unwrap(), WindowOptions::new(60_000, 1))
            .with_storage(yielding())
            .serialize_per_key(true),
    );

    let tasks = (0..8).map(|i| {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let identity = determine_ip(Some(format!("10.0.0.{}", i).as_str())).unwrap();
            limiter.check(&identity).await.unwrap().allowed
        })
    });

    let results = join_all(tasks).await;
    assert!(results.into_iter().all(|r| matches!(r, Ok(true))));
}
