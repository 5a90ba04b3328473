//! Vector store abstraction.
//!
//! The [`VectorStore`] trait covers everything the pipeline and the
//! maintenance commands need from the external store: idempotent schema
//! setup, upsert by deterministic id, equality queries, similarity search
//! and bulk deletion. Records are never mutated in place; an upsert with
//! an existing id replaces the whole record.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{SearchHit, StoredRecord, VectorRecord};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorStoreError {
    #[error("vector store unreachable: {0}")]
    Connection(String),
    #[error("vector store returned {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("schema setup failed: {0}")]
    Schema(String),
    #[error("vector store rejected record {id}: {message}")]
    Rejected { id: Uuid, message: String },
    #[error("unexpected vector store response: {0}")]
    Decode(String),
}

impl VectorStoreError {
    pub fn reason(&self) -> &'static str {
        match self {
            VectorStoreError::Connection(_) => "connection",
            VectorStoreError::HttpStatus { .. } => "http-status",
            VectorStoreError::Schema(_) => "schema",
            VectorStoreError::Rejected { .. } => "rejected",
            VectorStoreError::Decode(_) => "decode",
        }
    }
}

/// Outcome of [`VectorStore::ensure_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    Created,
    AlreadyExists,
}

/// Record properties that support equality filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    DocumentId,
    FileName,
}

impl RecordField {
    /// Property name in the store schema.
    pub fn property_name(&self) -> &'static str {
        match self {
            RecordField::DocumentId => "documentId",
            RecordField::FileName => "fileName",
        }
    }
}

/// Abstract vector store backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_schema`](VectorStore::ensure_schema) | Create the record class if absent |
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite a record by id |
/// | [`exists`](VectorStore::exists) | Whether a record id is present |
/// | [`delete`](VectorStore::delete) | Remove one record by id |
/// | [`query_by_equality`](VectorStore::query_by_equality) | Records whose field equals a value |
/// | [`search_near`](VectorStore::search_near) | Nearest records to a vector |
/// | [`delete_where`](VectorStore::delete_where) | Bulk delete by field value |
/// | [`delete_all`](VectorStore::delete_all) | Bulk delete every record |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the schema if it does not exist. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<SchemaStatus, VectorStoreError>;

    /// Write a record, replacing any record with the same id.
    async fn upsert(&self, record: &VectorRecord) -> Result<(), VectorStoreError>;

    /// Whether a record with this id is stored.
    async fn exists(&self, id: Uuid) -> Result<bool, VectorStoreError>;

    /// Delete a record by id. Deleting a missing record succeeds.
    async fn delete(&self, id: Uuid) -> Result<(), VectorStoreError>;

    /// Records whose `field` equals `value`, ordered by chunk index.
    async fn query_by_equality(
        &self,
        field: RecordField,
        value: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, VectorStoreError>;

    /// The `limit` records closest to `vector`.
    async fn search_near(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, VectorStoreError>;

    /// Delete every record whose `field` equals `value`; returns the count.
    async fn delete_where(&self, field: RecordField, value: &str)
        -> Result<usize, VectorStoreError>;

    /// Delete every record; returns the count.
    async fn delete_all(&self) -> Result<usize, VectorStoreError>;
}
