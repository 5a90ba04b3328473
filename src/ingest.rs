//! Ingestion pipeline orchestration.
//!
//! Coordinates one document through the full flow: source fetch →
//! validation → extraction → chunking → embedding → vector store upsert.
//! Every failure is returned as an [`IngestError`] tagged with the stage
//! that produced it; nothing is logged as an error here.
//!
//! Extraction is CPU-bound and runs on the blocking thread pool under a
//! timeout. Embedding and writes run one chunk at a time, in order.

use std::sync::Arc;
use std::time::Duration;

use docingest_core::chunk::{chunk_text, ChunkError, ChunkerConfig};
use docingest_core::embedding::{Embedder, EmbeddingError};
use docingest_core::models::RawDocument;
use docingest_core::source::{DocumentSource, SourceError};
use docingest_core::store::{SchemaStatus, VectorStore, VectorStoreError};
use docingest_core::upsert::{
    upsert_chunks, ChunkFailure, DocumentRef, UpsertError, WritePolicy,
};
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::extract::{extract_text, is_supported_mime, mime_for_extension, ExtractError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document not found: {0}")]
    SourceNotFound(String),
    #[error("document storage unavailable: {0}")]
    SourceUnavailable(String),
    #[error("document {document_id} is {size} bytes, limit is {limit}")]
    SourceTooLarge {
        document_id: String,
        size: u64,
        limit: u64,
    },
    #[error("unsupported format: {file_name} ({mime_type})")]
    UnsupportedFormat { file_name: String, mime_type: String },
    #[error("text extraction failed: {0}")]
    Extraction(ExtractError),
    #[error("chunking produced no chunks")]
    ChunkingProducedEmpty,
    #[error("embedding failed at chunk {index}: {source}; {rolled_back} new records rolled back")]
    Embedding {
        index: usize,
        source: EmbeddingError,
        rolled_back: usize,
    },
    #[error("upsert failed at chunk {index}: {source}; {rolled_back} new records rolled back")]
    Upsert {
        index: usize,
        source: VectorStoreError,
        rolled_back: usize,
    },
    #[error("invalid chunking settings: {0}")]
    InvalidSettings(ChunkError),
}

impl IngestError {
    /// Stable tag naming the pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            IngestError::SourceNotFound(_) => "source-not-found",
            IngestError::SourceUnavailable(_) => "source-unavailable",
            IngestError::SourceTooLarge { .. } => "source-too-large",
            IngestError::UnsupportedFormat { .. } => "unsupported-format",
            IngestError::Extraction(_) => "extraction-failed",
            IngestError::ChunkingProducedEmpty => "chunking-produced-empty",
            IngestError::Embedding { .. } => "embedding-failed",
            IngestError::Upsert { .. } => "upsert-failed",
            IngestError::InvalidSettings(_) => "invalid-settings",
        }
    }
}

impl From<SourceError> for IngestError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(id) => IngestError::SourceNotFound(id),
            SourceError::Unavailable(msg) => IngestError::SourceUnavailable(msg),
            SourceError::TooLarge {
                document_id,
                size,
                limit,
            } => IngestError::SourceTooLarge {
                document_id,
                size,
                limit,
            },
        }
    }
}

impl From<UpsertError> for IngestError {
    fn from(err: UpsertError) -> Self {
        match err {
            UpsertError::Embedding {
                index,
                source,
                rolled_back,
            } => IngestError::Embedding {
                index,
                source,
                rolled_back,
            },
            UpsertError::Write {
                index,
                source,
                rolled_back,
            } => IngestError::Upsert {
                index,
                source,
                rolled_back,
            },
        }
    }
}

/// Tunables for one [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunker: ChunkerConfig,
    pub max_file_bytes: u64,
    /// Lower-case extensions without the dot.
    pub allowed_extensions: Vec<String>,
    pub extract_timeout: Duration,
    pub preview_chars: usize,
    pub write_policy: WritePolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            max_file_bytes: 10 * 1024 * 1024,
            allowed_extensions: ["pdf", "doc", "docx", "txt", "html", "htm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extract_timeout: Duration::from_secs(30),
            preview_chars: 1000,
            write_policy: WritePolicy::default(),
        }
    }
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            chunker: config.chunking.chunker(),
            max_file_bytes: config.ingest.max_file_bytes,
            allowed_extensions: config
                .ingest
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            extract_timeout: Duration::from_secs(config.ingest.extract_timeout_secs),
            preview_chars: config.ingest.preview_chars,
            write_policy: config.ingest.policy()?,
        })
    }

    fn extension_allowed(&self, file_name: &str) -> bool {
        extension_of(file_name)
            .map(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
            .unwrap_or(false)
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Result of ingesting one document.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub document_id: String,
    pub file_name: String,
    pub mime_type: String,
    /// Extracted text length in characters.
    pub text_length: usize,
    pub chunk_count: usize,
    pub written: usize,
    pub failed: usize,
    pub record_ids: Vec<Uuid>,
    /// Leading characters of the extracted text.
    pub preview: String,
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Runs documents through the pipeline against injected collaborators.
pub struct Ingestor {
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        settings: IngestSettings,
    ) -> Result<Self, IngestError> {
        settings
            .chunker
            .validate()
            .map_err(IngestError::InvalidSettings)?;
        Ok(Self {
            source,
            embedder,
            store,
            settings,
        })
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Create the vector store schema if absent. Safe to call repeatedly.
    pub async fn ensure_schema(&self) -> Result<SchemaStatus, VectorStoreError> {
        self.store.ensure_schema().await
    }

    /// Fetch a stored document by id and ingest it.
    #[instrument(skip(self))]
    pub async fn ingest(&self, document_id: &str) -> Result<IngestSummary, IngestError> {
        let mut doc = self.source.get(document_id).await?;
        debug!(file_name = %doc.file_name, bytes = doc.bytes.len(), "document fetched");

        if !self.settings.extension_allowed(&doc.file_name) {
            return Err(IngestError::UnsupportedFormat {
                file_name: doc.file_name,
                mime_type: doc.mime_type,
            });
        }
        if !is_supported_mime(&doc.mime_type) {
            if let Some(mime) = extension_of(&doc.file_name)
                .as_deref()
                .and_then(mime_for_extension)
            {
                doc.mime_type = mime.to_string();
            }
        }

        self.ingest_raw(doc.into_raw(document_id)).await
    }

    /// Ingest document bytes that are already in hand.
    #[instrument(skip_all, fields(document_id = %doc.document_id, file_name = %doc.file_name))]
    pub async fn ingest_raw(&self, doc: RawDocument) -> Result<IngestSummary, IngestError> {
        let RawDocument {
            document_id,
            file_name,
            mime_type,
            bytes,
        } = doc;

        let size = bytes.len() as u64;
        if size > self.settings.max_file_bytes {
            return Err(IngestError::SourceTooLarge {
                document_id,
                size,
                limit: self.settings.max_file_bytes,
            });
        }

        let text = self.extract(bytes, &mime_type).await.map_err(|e| match e {
            ExtractError::UnsupportedType(_) => IngestError::UnsupportedFormat {
                file_name: file_name.clone(),
                mime_type: mime_type.clone(),
            },
            other => IngestError::Extraction(other),
        })?;
        let text_length = text.chars().count();
        debug!(text_length, "text extracted");

        let chunks =
            chunk_text(&text, &self.settings.chunker).map_err(IngestError::InvalidSettings)?;
        if chunks.is_empty() {
            return Err(IngestError::ChunkingProducedEmpty);
        }
        debug!(chunks = chunks.len(), "text chunked");

        let report = upsert_chunks(
            self.embedder.as_ref(),
            self.store.as_ref(),
            DocumentRef {
                document_id: &document_id,
                file_name: &file_name,
            },
            &chunks,
            self.settings.write_policy,
        )
        .await?;

        if report.written() == 0 {
            if let Some((index, failure)) = report.first_failure() {
                return Err(match failure.clone() {
                    ChunkFailure::Embedding(source) => IngestError::Embedding {
                        index,
                        source,
                        rolled_back: 0,
                    },
                    ChunkFailure::Write(source) => IngestError::Upsert {
                        index,
                        source,
                        rolled_back: 0,
                    },
                });
            }
        }

        info!(
            chunks = chunks.len(),
            written = report.written(),
            failed = report.failed(),
            "document ingested"
        );

        Ok(IngestSummary {
            preview: preview(&text, self.settings.preview_chars),
            document_id,
            file_name,
            mime_type,
            text_length,
            chunk_count: chunks.len(),
            written: report.written(),
            failed: report.failed(),
            record_ids: report.written_ids(),
        })
    }

    async fn extract(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String, ExtractError> {
        let mime = mime_type.to_string();
        let timeout = self.settings.extract_timeout;
        let task = tokio::task::spawn_blocking(move || extract_text(&bytes, &mime));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ExtractError::Corrupt(format!(
                "extraction task failed: {}",
                join_err
            ))),
            Err(_) => Err(ExtractError::Timeout(timeout.as_secs())),
        }
    }
}
