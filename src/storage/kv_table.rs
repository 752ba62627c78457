//! Durable key-value table adapter.
//!
//! Values are stored as JSON documents in rows shaped like the `kv_store`
//! table (`key`, `value`, `created_at`, `updated_at`). The SQL side is an
//! external collaborator reached through the narrow [`KvTable`] trait.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{Storage, StorageResult};

/// A single row of the key-value table.
#[derive(Debug, Clone, PartialEq)]
pub struct KvRow {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row-level operations a durable key-value table must provide.
///
/// `key` is unique across the table.
#[async_trait]
pub trait KvTable: Send + Sync {
    /// Find the row for `key`.
    async fn find(&self, key: &str) -> StorageResult<Option<KvRow>>;

    /// Insert a new row.
    async fn insert(&self, key: &str, value: serde_json::Value) -> StorageResult<()>;

    /// Replace the value of an existing row and bump `updated_at`.
    async fn update(&self, key: &str, value: serde_json::Value) -> StorageResult<()>;

    /// Delete the row for `key`, if any.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Every key in the table.
    async fn select_keys(&self) -> StorageResult<Vec<String>>;
}

/// [`Storage`] over a [`KvTable`], encoding values as JSON.
///
/// A row whose value does not decode as `V` reads as absent, so stale or
/// foreign rows never break an admission check.
pub struct KvTableStorage<V> {
    table: Arc<dyn KvTable>,
    _value: PhantomData<fn() -> V>,
}

impl<V> KvTableStorage<V> {
    /// Create a storage adapter over `table`.
    pub fn new(table: Arc<dyn KvTable>) -> Self {
        Self {
            table,
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<V> Storage<V> for KvTableStorage<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        let Some(row) = self.table.find(key).await? else {
            return Ok(None);
        };

        match serde_json::from_value(row.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(key = %key, error = %e, "Ignoring undecodable kv row");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: V) -> StorageResult<()> {
        let value = serde_json::to_value(value)?;

        if self.table.find(key).await?.is_some() {
            self.table.update(key, value).await
        } else {
            self.table.insert(key, value).await
        }
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.table.delete(key).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.table.select_keys().await
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.table.find(key).await?.is_some())
    }
}

/// In-process [`KvTable`], ordered by key.
#[derive(Debug, Default)]
pub struct MemoryKvTable {
    rows: RwLock<BTreeMap<String, KvRow>>,
}

impl MemoryKvTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl KvTable for MemoryKvTable {
    async fn find(&self, key: &str) -> StorageResult<Option<KvRow>> {
        Ok(self.rows.read().get(key).cloned())
    }

    async fn insert(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let now = Utc::now();
        self.rows.write().insert(
            key.to_string(),
            KvRow {
                key: key.to_string(),
                value,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn update(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        if let Some(row) = self.rows.write().get_mut(key) {
            row.value = value;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.rows.write().remove(key);
        Ok(())
    }

    async fn select_keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.rows.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_inserts_then_updates() {
        let table = Arc::new(MemoryKvTable::new());
        let storage: KvTableStorage<Vec<i64>> = KvTableStorage::new(table.clone());

        storage.set("get-products:127.0.0.2", vec![1, 2]).await.unwrap();
        let created = table.find("get-products:127.0.0.2").await.unwrap().unwrap();

        storage.set("get-products:127.0.0.2", vec![3]).await.unwrap();
        let updated = table.find("get-products:127.0.0.2").await.unwrap().unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(
            storage.get("get-products:127.0.0.2").await.unwrap(),
            Some(vec![3])
        );
    }

    #[tokio::test]
    async fn test_undecodable_row_reads_as_absent() {
        let table = Arc::new(MemoryKvTable::new());
        table
            .insert("k", serde_json::json!({"not": "a log"}))
            .await
            .unwrap();

        let storage: KvTableStorage<Vec<i64>> = KvTableStorage::new(table);
        assert_eq!(storage.get("k").await.unwrap(), None);
        assert!(storage.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_and_keys() {
        let table = Arc::new(MemoryKvTable::new());
        let storage: KvTableStorage<u64> = KvTableStorage::new(table.clone());

        storage.set("b", 2).await.unwrap();
        storage.set("a", 1).await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["a", "b"]);

        storage.remove("a").await.unwrap();
        storage.remove("missing").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["b"]);
        assert!(!table.is_empty());
    }
}
