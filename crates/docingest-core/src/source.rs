//! Document byte store abstraction.
//!
//! The pipeline fetches uploaded documents by id through [`DocumentSource`];
//! uploads go through [`DocumentSource::put`]. The filesystem-backed
//! implementation lives in the app crate; [`InMemorySource`] serves tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::SourceDocument;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document {document_id} is {size} bytes, limit is {limit}")]
    TooLarge {
        document_id: String,
        size: u64,
        limit: u64,
    },
    #[error("document storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch a stored document's bytes, MIME type and file name.
    async fn get(&self, document_id: &str) -> Result<SourceDocument, SourceError>;

    /// Store document bytes under an id; returns where they were written.
    async fn put(
        &self,
        document_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, SourceError>;

    /// Ids of every stored document.
    async fn list(&self) -> Result<Vec<String>, SourceError>;
}

/// Documents held in a map; MIME types are supplied by the caller.
#[derive(Default)]
pub struct InMemorySource {
    docs: RwLock<HashMap<String, SourceDocument>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document.
    pub fn insert(&self, document_id: &str, file_name: &str, mime_type: &str, bytes: &[u8]) {
        let mut docs = self.docs.write().unwrap_or_else(|p| p.into_inner());
        docs.insert(
            document_id.to_string(),
            SourceDocument {
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    async fn get(&self, document_id: &str) -> Result<SourceDocument, SourceError> {
        let docs = self.docs.read().unwrap_or_else(|p| p.into_inner());
        docs.get(document_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(document_id.to_string()))
    }

    async fn put(
        &self,
        document_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, SourceError> {
        self.insert(document_id, file_name, "application/octet-stream", bytes);
        Ok(format!("memory://{}/{}", document_id, file_name))
    }

    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let docs = self.docs.read().unwrap_or_else(|p| p.into_inner());
        let mut ids: Vec<String> = docs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
