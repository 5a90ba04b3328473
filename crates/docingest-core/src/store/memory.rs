//! In-memory [`VectorStore`] implementation for tests and local dry runs.
//!
//! Records live in a `HashMap` keyed by id behind a `std::sync::RwLock`.
//! Similarity search is brute-force cosine over every stored vector.
//! Writes can be made to fail after a number of successes to exercise
//! partial-failure handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::models::{SearchHit, StoredRecord, VectorRecord};

use super::{RecordField, SchemaStatus, VectorStore, VectorStoreError};

/// In-memory store.
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<Uuid, VectorRecord>>,
    schema_created: RwLock<bool>,
    upserts: AtomicUsize,
    fail_after: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            schema_created: RwLock::new(false),
            upserts: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    /// A store whose upserts fail once `successes` writes have gone through.
    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::new()
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all held records, sorted.
    pub fn ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn get(&self, id: &Uuid) -> Option<VectorRecord> {
        self.read().get(id).cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, VectorRecord>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, VectorRecord>> {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_stored(record: &VectorRecord) -> StoredRecord {
    StoredRecord {
        id: record.id,
        chunk: record.properties.chunk.clone(),
        file_name: record.properties.file_name.clone(),
        document_id: record.properties.document_id.clone(),
        chunk_index: Some(record.properties.chunk_index),
    }
}

fn field_value(record: &VectorRecord, field: RecordField) -> &str {
    match field {
        RecordField::DocumentId => &record.properties.document_id,
        RecordField::FileName => &record.properties.file_name,
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_schema(&self) -> Result<SchemaStatus, VectorStoreError> {
        let mut created = self
            .schema_created
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *created {
            Ok(SchemaStatus::AlreadyExists)
        } else {
            *created = true;
            Ok(SchemaStatus::Created)
        }
    }

    async fn upsert(&self, record: &VectorRecord) -> Result<(), VectorStoreError> {
        let attempt = self.upserts.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if attempt >= limit {
                return Err(VectorStoreError::Rejected {
                    id: record.id,
                    message: "injected write failure".to_string(),
                });
            }
        }
        self.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> Result<bool, VectorStoreError> {
        Ok(self.read().contains_key(&id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), VectorStoreError> {
        self.write().remove(&id);
        Ok(())
    }

    async fn query_by_equality(
        &self,
        field: RecordField,
        value: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, VectorStoreError> {
        let records = self.read();
        let mut matches: Vec<StoredRecord> = records
            .values()
            .filter(|r| field_value(r, field) == value)
            .map(to_stored)
            .collect();
        matches.sort_by_key(|r| r.chunk_index);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn search_near(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let records = self.read();
        let mut hits: Vec<SearchHit> = records
            .values()
            .map(|r| SearchHit {
                record: to_stored(r),
                distance: 1.0 - cosine_similarity(vector, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_where(
        &self,
        field: RecordField,
        value: &str,
    ) -> Result<usize, VectorStoreError> {
        let mut records = self.write();
        let before = records.len();
        records.retain(|_, r| field_value(r, field) != value);
        Ok(before - records.len())
    }

    async fn delete_all(&self) -> Result<usize, VectorStoreError> {
        let mut records = self.write();
        let count = records.len();
        records.clear();
        Ok(count)
    }
}
