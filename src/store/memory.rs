use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheStore, StoredEntry};
use crate::error::StoreResult;

/// Store en memoria: un `DashMap` de namespaces, cada uno con sus entradas.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: DashMap<String, DashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<StoredEntry>> {
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key).map(|entry| entry.clone())))
    }

    async fn put(&self, namespace: &str, entry: StoredEntry) -> StoreResult<()> {
        entry.check_length()?;
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(entry.meta.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        Ok(self
            .namespaces
            .get(namespace)
            .map_or(false, |ns| ns.remove(key).is_some()))
    }

    async fn keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .namespaces
            .get(namespace)
            .map(|ns| ns.iter().map(|entry| entry.key().clone()).collect())
            .unwrap_or_default())
    }

    async fn entry_len(&self, namespace: &str, key: &str) -> StoreResult<Option<u64>> {
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key).map(|entry| entry.meta.content_length)))
    }

    async fn namespaces(&self) -> StoreResult<Vec<String>> {
        Ok(self.namespaces.iter().map(|ns| ns.key().clone()).collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> StoreResult<bool> {
        Ok(self.namespaces.remove(namespace).is_some())
    }
}
