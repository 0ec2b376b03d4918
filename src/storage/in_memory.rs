use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{sort_for_listing, BatchStore, Collections, Entity, Repository};
use crate::domain::{
    BatchRevision, BatchStatus, DataType, FinancialTransaction, Grade, ImportBatch, InventoryItem,
    SchoolClass, Student, Teacher, User,
};
use crate::error::{ImportError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Every critical section is a single map operation, so a poisoned map is still consistent.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory batch store for development/testing.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    batches: Mutex<HashMap<String, ImportBatch>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn copy_review_fields(stored: &mut ImportBatch, batch: &ImportBatch) {
    stored.status = batch.status;
    stored.reviewed_by = batch.reviewed_by.clone();
    stored.reviewed_at = batch.reviewed_at;
    stored.failure_reason = batch.failure_reason.clone();
    stored.skipped_lines = batch.skipped_lines.clone();
    stored.apply_claim = batch.apply_claim.clone();
    stored.claimed_at = batch.claimed_at;
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn insert(&self, batch: &ImportBatch) -> Result<()> {
        let mut batches = lock(&self.batches);
        if batches.contains_key(&batch.id) {
            return Err(ImportError::DuplicateBatch(batch.id.clone()));
        }
        batches.insert(batch.id.clone(), batch.clone());
        debug!("Stored import batch {}", batch.id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ImportBatch>> {
        Ok(lock(&self.batches).get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ImportBatch>> {
        let mut all: Vec<ImportBatch> = lock(&self.batches).values().cloned().collect();
        sort_for_listing(&mut all);
        Ok(all)
    }

    async fn find_pending_by_hash(
        &self,
        data_type: DataType,
        content_sha256: &str,
    ) -> Result<Option<String>> {
        let batches = lock(&self.batches);
        let mut matches: Vec<&ImportBatch> = batches
            .values()
            .filter(|b| {
                b.status == BatchStatus::Pending
                    && b.data_type == data_type
                    && b.content_sha256 == content_sha256
            })
            .collect();
        matches.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matches.first().map(|b| b.id.clone()))
    }

    async fn replace(&self, batch: &ImportBatch) -> Result<()> {
        let mut batches = lock(&self.batches);
        let stored = batches
            .get_mut(&batch.id)
            .ok_or_else(|| ImportError::BatchNotFound(batch.id.clone()))?;
        copy_review_fields(stored, batch);
        debug!("Updated import batch {} to {}", batch.id, batch.status);
        Ok(())
    }

    async fn compare_and_replace(
        &self,
        expected: &BatchRevision,
        batch: &ImportBatch,
    ) -> Result<bool> {
        let mut batches = lock(&self.batches);
        let stored = batches
            .get_mut(&batch.id)
            .ok_or_else(|| ImportError::BatchNotFound(batch.id.clone()))?;
        if stored.revision() != *expected {
            return Ok(false);
        }
        copy_review_fields(stored, batch);
        Ok(true)
    }
}

/// In-memory keyed collection; the test double for every target family.
pub struct InMemoryRepository<E: Entity> {
    rows: Mutex<HashMap<E::Key, E>>,
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the collection with existing entities.
    pub fn with_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let rows = entities.into_iter().map(|e| (e.key(), e)).collect();
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn get(&self, key: &E::Key) -> Option<E> {
        lock(&self.rows).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.rows).is_empty()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for InMemoryRepository<E> {
    async fn find_by_key(&self, key: &E::Key) -> Result<Option<E>> {
        Ok(lock(&self.rows).get(key).cloned())
    }

    async fn upsert(&self, entity: E) -> Result<()> {
        let key = entity.key();
        debug!("Upserted {} {}", E::COLLECTION, key);
        lock(&self.rows).insert(key, entity);
        Ok(())
    }
}

/// Concrete in-memory repositories, kept typed so callers can inspect them.
#[derive(Clone, Default)]
pub struct InMemoryCollections {
    pub classes: Arc<InMemoryRepository<SchoolClass>>,
    pub students: Arc<InMemoryRepository<Student>>,
    pub teachers: Arc<InMemoryRepository<Teacher>>,
    pub grades: Arc<InMemoryRepository<Grade>>,
    pub transactions: Arc<InMemoryRepository<FinancialTransaction>>,
    pub inventory: Arc<InMemoryRepository<InventoryItem>>,
    pub users: Arc<InMemoryRepository<User>>,
}

impl InMemoryCollections {
    pub fn collections(&self) -> Collections {
        Collections {
            classes: self.classes.clone(),
            students: self.students.clone(),
            teachers: self.teachers.clone(),
            grades: self.grades.clone(),
            transactions: self.transactions.clone(),
            inventory: self.inventory.clone(),
            users: self.users.clone(),
        }
    }
}
