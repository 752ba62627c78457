//! Named regions mounted on a shared backend.

use async_trait::async_trait;

use super::{SharedStorage, Storage, StorageResult};

/// A view onto a shared store where every key lives under `"{region}:"`.
///
/// Several regions can share one backend without seeing each other's keys.
pub struct PrefixedStorage<V> {
    inner: SharedStorage<V>,
    prefix: String,
}

impl<V> PrefixedStorage<V>
where
    V: Send + Sync + 'static,
{
    /// Mount `region` on `inner`.
    pub fn new(inner: SharedStorage<V>, region: &str) -> Self {
        Self {
            inner,
            prefix: format!("{}:", region),
        }
    }

    /// The region name this view is mounted under.
    pub fn region(&self) -> &str {
        self.prefix.trim_end_matches(':')
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl<V> Storage<V> for PrefixedStorage<V>
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        self.inner.get(&self.full_key(key)).await
    }

    async fn set(&self, key: &str, value: V) -> StorageResult<()> {
        self.inner.set(&self.full_key(key), value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(&self.full_key(key)).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let keys = self.inner.keys().await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        self.inner.has(&self.full_key(key)).await
    }
}
