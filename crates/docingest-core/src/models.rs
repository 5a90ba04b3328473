//! Data types that flow through the ingestion pipeline.
//!
//! A [`RawDocument`] lives only for the duration of one ingestion call. It
//! is extracted to text, split into [`Chunk`]s, embedded into
//! [`EmbeddedChunk`]s and persisted as [`VectorRecord`]s, which the vector
//! store owns from then on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document bytes plus the metadata needed to pick an extractor.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub document_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// What a [`DocumentSource`](crate::source::DocumentSource) hands back for a document id.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn into_raw(self, document_id: &str) -> RawDocument {
        RawDocument {
            document_id: document_id.to_string(),
            file_name: self.file_name,
            mime_type: self.mime_type,
            bytes: self.bytes,
        }
    }
}

/// A bounded substring of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in extraction order, contiguous from 0.
    pub index: usize,
    pub text: String,
    /// SHA-256 hex digest of `text`.
    pub hash: String,
}

/// A chunk together with its vector and owning document.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub document_id: String,
    pub file_name: String,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Properties stored alongside each vector.
///
/// Field names match the `DocumentChunk` class schema in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProperties {
    pub chunk: String,
    pub file_name: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub created_at: DateTime<Utc>,
}

/// The persisted form of an [`EmbeddedChunk`], keyed by a deterministic id.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: Uuid,
    pub properties: RecordProperties,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    /// Builds the record for an embedded chunk, deriving its id from
    /// `(document_id, chunk text)`.
    pub fn from_embedded(embedded: EmbeddedChunk) -> Self {
        let id = crate::identity::record_id(&embedded.document_id, &embedded.chunk.text);
        Self {
            id,
            properties: RecordProperties {
                chunk: embedded.chunk.text,
                file_name: embedded.file_name,
                document_id: embedded.document_id,
                chunk_index: embedded.chunk.index as i64,
                created_at: Utc::now(),
            },
            vector: embedded.vector,
        }
    }
}

/// A record read back from the vector store (vector omitted).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub chunk: String,
    pub file_name: String,
    pub document_id: String,
    pub chunk_index: Option<i64>,
}

/// A similarity search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub record: StoredRecord,
    /// Cosine distance (`1 - similarity`); lower is closer.
    pub distance: f32,
}
