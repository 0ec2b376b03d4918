//! Storage seams for the import pipeline.
//!
//! The pipeline owns the batch audit trail ([`BatchStore`]) and talks to each target entity
//! family only through the narrow [`Repository`] interface: find by key, upsert by key.
//! Neither seam exposes deletion.

pub mod in_memory;
pub mod sqlite;

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{
    BatchRevision, DataType, FinancialTransaction, Grade, ImportBatch, InventoryItem, SchoolClass,
    Student, Teacher, User,
};
use crate::error::Result;

pub use in_memory::{InMemoryBatchStore, InMemoryCollections, InMemoryRepository};
pub use sqlite::{SqliteBatchStore, SqliteCatalog, SqliteRepository};

/// A record addressable by key inside a named collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    type Key: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    /// Text a backend stores the key under. Must be injective over keys.
    fn storage_key(key: &Self::Key) -> String {
        key.to_string()
    }
}

/// Target collection contract: find by key, upsert by key.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn find_by_key(&self, key: &E::Key) -> Result<Option<E>>;

    /// Insert `entity`, or replace the stored entity with the same key.
    async fn upsert(&self, entity: E) -> Result<()>;
}

/// Append-only store of import batches.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Fails with `DuplicateBatch` if the id is already taken.
    async fn insert(&self, batch: &ImportBatch) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<ImportBatch>>;

    /// All batches, most recently submitted first; ties ordered by id.
    async fn list(&self) -> Result<Vec<ImportBatch>>;

    /// Id of a `pending` batch of `data_type` whose content hashes to `content_sha256`.
    async fn find_pending_by_hash(
        &self,
        data_type: DataType,
        content_sha256: &str,
    ) -> Result<Option<String>>;

    /// Overwrite the review fields of an existing batch. Submission fields, including the raw
    /// content, are never rewritten.
    async fn replace(&self, batch: &ImportBatch) -> Result<()>;

    /// Like [`BatchStore::replace`], but only if the stored status and apply claim still equal
    /// `expected`. Returns whether the write happened.
    async fn compare_and_replace(
        &self,
        expected: &BatchRevision,
        batch: &ImportBatch,
    ) -> Result<bool>;
}

/// Listing order shared by every backend.
pub(crate) fn sort_for_listing(batches: &mut [ImportBatch]) {
    batches.sort_by(|a, b| {
        b.submitted_at
            .cmp(&a.submitted_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// One repository per target entity family.
#[derive(Clone)]
pub struct Collections {
    pub classes: Arc<dyn Repository<SchoolClass>>,
    pub students: Arc<dyn Repository<Student>>,
    pub teachers: Arc<dyn Repository<Teacher>>,
    pub grades: Arc<dyn Repository<Grade>>,
    pub transactions: Arc<dyn Repository<FinancialTransaction>>,
    pub inventory: Arc<dyn Repository<InventoryItem>>,
    pub users: Arc<dyn Repository<User>>,
}

impl Collections {
    pub fn in_memory() -> Self {
        InMemoryCollections::default().collections()
    }
}

impl fmt::Debug for Collections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collections").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_listing_sorts_newest_first_then_by_id() {
        let now = Utc::now();
        let mut a = ImportBatch::new(DataType::ClassList, "a.csv", "id\n1", "x");
        let mut b = ImportBatch::new(DataType::ClassList, "b.csv", "id\n1", "x");
        let mut c = ImportBatch::new(DataType::ClassList, "c.csv", "id\n1", "x");
        a.id = "batch-b".into();
        b.id = "batch-a".into();
        c.id = "batch-c".into();
        a.submitted_at = now;
        b.submitted_at = now;
        c.submitted_at = now + Duration::seconds(5);

        let mut batches = vec![a, b, c];
        sort_for_listing(&mut batches);
        let ids: Vec<&str> = batches.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["batch-c", "batch-a", "batch-b"]);
    }
}
