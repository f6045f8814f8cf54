//! Process-local document store.
//!
//! Used for offline development and tests. Documents are kept in a
//! [`DashMap`] keyed by `(collection, id)`; the entry API makes `create`
//! atomic per key.

use crate::db::{CreateOutcome, Document, DocumentStore, SetOptions};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

type Key = (String, String);

/// In-memory document store. Clones share the same documents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<DashMap<Key, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.docs.iter().filter(|e| e.key().0 == collection).count()
    }

    fn key(collection: &str, id: &str) -> Key {
        (collection.to_string(), id.to_string())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .docs
            .get(&Self::key(collection, id))
            .map(|doc| doc.value().clone()))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        match self.docs.entry(Self::key(collection, id)) {
            Entry::Occupied(mut existing) if options.merge => {
                existing.get_mut().extend(doc);
            }
            Entry::Occupied(mut existing) => {
                existing.insert(doc);
            }
            Entry::Vacant(slot) => {
                slot.insert(doc);
            }
        }
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> Result<CreateOutcome, StoreError> {
        match self.docs.entry(Self::key(collection, id)) {
            Entry::Occupied(_) => Ok(CreateOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(doc);
                Ok(CreateOutcome::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_merge_keeps_existing_fields() {
        let store = MemoryStore::new();
        store
            .set("users", "u1", doc(json!({"a": 1, "b": 2})), SetOptions::replace())
            .await
            .unwrap();
        store
            .set("users", "u1", doc(json!({"b": 3})), SetOptions::merge())
            .await
            .unwrap();

        let stored = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(stored, doc(json!({"a": 1, "b": 3})));
    }

    #[tokio::test]
    async fn test_replace_drops_missing_fields() {
        let store = MemoryStore::new();
        store
            .set("users", "u1", doc(json!({"a": 1, "b": 2})), SetOptions::replace())
            .await
            .unwrap();
        store
            .set("users", "u1", doc(json!({"b": 3})), SetOptions::replace())
            .await
            .unwrap();

        let stored = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(stored, doc(json!({"b": 3})));
    }

    #[tokio::test]
    async fn test_create_is_conditional() {
        let store = MemoryStore::new();
        let first = store
            .create("users", "u1", doc(json!({"n": 1})))
            .await
            .unwrap();
        let second = store
            .create("users", "u1", doc(json!({"n": 2})))
            .await
            .unwrap();

        assert_eq!(first, CreateOutcome::Created);
        assert_eq!(second, CreateOutcome::AlreadyExists);
        let stored = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(stored["n"], 1);
        assert_eq!(store.count("users"), 1);
    }
}
