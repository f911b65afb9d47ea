//! In-memory result stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::output::{DatasetRow, DatasetSink, KeyValueStore, StoreError, StoredValue};

/// Key-value store kept in a map.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<RwLock<BTreeMap<String, StoredValue>>>,
    /// If set, every put fails with this message.
    fail_puts: Arc<RwLock<Option<String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys in sorted order.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Stored value parsed as JSON.
    pub async fn json(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        let value = entries.get(key)?;
        serde_json::from_slice(&value.bytes).ok()
    }

    /// Make every subsequent put fail.
    pub async fn fail_puts(&self, message: impl Into<String>) {
        *self.fail_puts.write().await = Some(message.into());
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        if let Some(message) = self.fail_puts.read().await.clone() {
            return Err(StoreError::Database(message));
        }
        self.entries.write().await.insert(
            key.to_string(),
            StoredValue {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Dataset that collects rows in memory.
#[derive(Debug, Default)]
pub struct MemoryDataset {
    rows: Arc<RwLock<Vec<DatasetRow>>>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self) -> Vec<DatasetRow> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl DatasetSink for MemoryDataset {
    async fn push(&self, rows: &[DatasetRow]) -> Result<(), StoreError> {
        self.rows.write().await.extend_from_slice(rows);
        Ok(())
    }
}
