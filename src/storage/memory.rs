//! In-process storage backed by DashMap.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Storage, StorageResult};

/// Thread-safe sharded in-memory store.
///
/// DashMap shards its locks by key, so concurrent limiters checking
/// unrelated identities never wait on each other.
#[derive(Debug)]
pub struct MemoryStorage<V> {
    map: DashMap<String, V>,
}

impl<V> MemoryStorage<V> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<V> Default for MemoryStorage<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> Storage<V> for MemoryStorage<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        Ok(self.map.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: V) -> StorageResult<()> {
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.map.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.map.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let storage: MemoryStorage<u32> = MemoryStorage::new();
        assert_eq!(storage.get("missing").await.unwrap(), None);
        assert!(!storage.has("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_is_last_write_wins() {
        let storage = MemoryStorage::new();
        storage.set("k", 1u32).await.unwrap();
        storage.set("k", 7u32).await.unwrap();

        assert_eq!(storage.get("k").await.unwrap(), Some(7));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_noop() {
        let storage: MemoryStorage<u32> = MemoryStorage::new();
        storage.remove("nothing").await.unwrap();

        storage.set("k", 1).await.unwrap();
        storage.remove("k").await.unwrap();
        storage.remove("k").await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_keys_snapshot() {
        let storage = MemoryStorage::new();
        storage.set("a", 1u32).await.unwrap();
        storage.set("b", 2u32).await.unwrap();

        let mut keys = storage.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
