//! Content storage collaborator used to hydrate search hits.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use memory_types::ContentRecord;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentStoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Content store lock poisoned")]
    Poisoned,
}

/// Read access to a node's content records.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a record; `None` if it no longer exists.
    async fn get_by_id(&self, id: &str) -> Result<Option<ContentRecord>, ContentStoreError>;
}

/// Content store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    records: RwLock<HashMap<String, ContentRecord>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ContentRecord>,
    {
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Insert or replace a record, returning the previous one.
    pub fn put(&self, record: ContentRecord) -> Result<Option<ContentRecord>, ContentStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| ContentStoreError::Poisoned)?;
        Ok(records.insert(record.id.clone(), record))
    }

    pub fn remove(&self, id: &str) -> Result<Option<ContentRecord>, ContentStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| ContentStoreError::Poisoned)?;
        Ok(records.remove(id))
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<ContentRecord>, ContentStoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| ContentStoreError::Poisoned)?;
        Ok(records.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_remove() {
        let store = InMemoryContentStore::new();
        assert!(store.is_empty());

        store.put(ContentRecord::new("a", "alpha")).unwrap();
        let previous = store.put(ContentRecord::new("a", "alpha v2")).unwrap();
        assert_eq!(previous.unwrap().content, "alpha");
        assert_eq!(store.len(), 1);

        let record = store.get_by_id("a").await.unwrap().unwrap();
        assert_eq!(record.content, "alpha v2");

        store.remove("a").unwrap();
        assert!(store.get_by_id("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_with_records() {
        let store = InMemoryContentStore::with_records(vec![
            ContentRecord::new("a", "alpha"),
            ContentRecord::new("b", "beta"),
        ]);
        assert_eq!(store.len(), 2);
        assert!(store.get_by_id("b").await.unwrap().is_some());
        assert!(store.get_by_id("c").await.unwrap().is_none());
    }
}
