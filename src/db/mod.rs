//! Database layer (document store).
//!
//! Profiles live in a document store keyed by identity id. The store is
//! reached through [`DocumentStore`] so the session core does not care
//! whether documents land in Firestore or in process memory.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::StoreError;
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    /// User profiles (keyed by identity id)
    pub const USERS: &str = "users";
}

/// A stored document: a JSON object of top-level fields.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Options for [`DocumentStore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge the given top-level fields into an existing document instead
    /// of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }

    pub fn replace() -> Self {
        Self { merge: false }
    }
}

/// Result of a conditional create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Minimal document store contract.
///
/// Implementations must be strongly consistent for reads-after-writes from
/// the same client, and `create` must be atomic: of several concurrent
/// creates for one id, exactly one reports [`CreateOutcome::Created`].
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch a document, `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document, replacing or merging per `options`.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
        options: SetOptions,
    ) -> Result<(), StoreError>;

    /// Write a document only if none exists for `id`.
    async fn create(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> Result<CreateOutcome, StoreError>;
}

/// Convert a serializable value into a [`Document`].
pub fn to_document<T: serde::Serialize>(
    collection: &str,
    id: &str,
    value: &T,
) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Malformed {
            collection: collection.to_string(),
            id: id.to_string(),
            reason: format!("expected an object, got {}", other),
        }),
        Err(e) => Err(StoreError::Malformed {
            collection: collection.to_string(),
            id: id.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Decode a [`Document`] into a typed value.
pub fn from_document<T: serde::de::DeserializeOwned>(
    collection: &str,
    id: &str,
    doc: Document,
) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::Object(doc)).map_err(|e| StoreError::Malformed {
        collection: collection.to_string(),
        id: id.to_string(),
        reason: e.to_string(),
    })
}
