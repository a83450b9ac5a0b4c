//! Remote document store contract and implementations.
//!
//! All books and answers live in per-user collections of a document store.
//! The core only depends on the `DocumentStore` trait:
//!
//! - `MemoryStore`: in-process store with live listeners, used offline and
//!   in tests
//! - `FirestoreStore`: Firestore REST adapter; live listeners are emulated by
//!   polling

pub mod document;
pub mod error;
pub mod firestore;
pub mod memory;
pub mod subscription;

use async_trait::async_trait;

pub use document::{
    Collection, CollectionPath, Document, Fields, Filter, Query, Write, WriteBatch,
    CREATED_AT_FIELD, MAX_BATCH_WRITES, MAX_IN_FILTER_VALUES,
};
pub use error::StoreError;
pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use subscription::{Snapshot, Subscription, SubscriptionSink};

use crate::utils::new_document_id;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Apply every write in the batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Run a one-shot query; results are in store order.
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Start a live query. The first snapshot is the current result set.
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;

    /// Create one document with a generated id and return that id.
    async fn create(&self, collection: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        let id = new_document_id();
        let mut batch = WriteBatch::new();
        batch.create(collection, id.clone(), fields);
        self.commit(batch).await?;
        Ok(id)
    }

    async fn update(&self, collection: &CollectionPath, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.update(collection, id, fields);
        self.commit(batch).await
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(collection, id);
        self.commit(batch).await
    }
}
