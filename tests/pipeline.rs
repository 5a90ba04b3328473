//! End-to-end pipeline tests against in-memory collaborators.
//!
//! The document source and vector store are the in-memory implementations
//! from `docingest-core`; the embedder is a deterministic local fake, so no
//! network is involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docingest::ingest::{IngestError, IngestSettings, Ingestor};
use docingest_core::chunk::ChunkerConfig;
use docingest_core::embedding::{Embedder, EmbeddingError};
use docingest_core::identity::record_id;
use docingest_core::models::RawDocument;
use docingest_core::source::InMemorySource;
use docingest_core::store::memory::InMemoryVectorStore;
use docingest_core::store::{RecordField, SchemaStatus, VectorStore};
use docingest_core::upsert::WritePolicy;

/// Bag-of-letters embedding; optionally fails from a given call onwards.
struct LetterEmbedder {
    calls: AtomicUsize,
    fail_from: Option<usize>,
}

impl LetterEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from: None,
        }
    }

    fn failing_from(call: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from: Some(call),
        }
    }
}

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> Option<usize> {
        Some(26)
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_from.is_some_and(|from| call >= from) {
            return Err(EmbeddingError::HttpStatus {
                status: 500,
                body: "model unavailable".to_string(),
            });
        }
        let mut v = vec![0.0f32; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Ok(v)
    }
}

fn long_text() -> String {
    (0..60)
        .map(|i| format!("Paragraph {} explains how the ingestion pipeline works. ", i))
        .collect()
}

fn settings(policy: WritePolicy) -> IngestSettings {
    IngestSettings {
        chunker: ChunkerConfig::new(300, 50).unwrap(),
        write_policy: policy,
        ..IngestSettings::default()
    }
}

struct Harness {
    source: Arc<InMemorySource>,
    store: Arc<InMemoryVectorStore>,
    ingestor: Ingestor,
}

fn harness(embedder: LetterEmbedder, store: InMemoryVectorStore, policy: WritePolicy) -> Harness {
    let source = Arc::new(InMemorySource::new());
    let store = Arc::new(store);
    let ingestor = Ingestor::new(
        source.clone(),
        Arc::new(embedder),
        store.clone(),
        settings(policy),
    )
    .unwrap();
    Harness {
        source,
        store,
        ingestor,
    }
}

#[tokio::test]
async fn test_ingest_writes_every_chunk() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    let text = long_text();
    h.source
        .insert("42", "guide.txt", "text/plain", text.as_bytes());

    let summary = h.ingestor.ingest("42").await.unwrap();
    assert_eq!(summary.document_id, "42");
    assert_eq!(summary.file_name, "guide.txt");
    assert_eq!(summary.text_length, text.trim().chars().count());
    assert!(summary.chunk_count > 1);
    assert_eq!(summary.written, summary.chunk_count);
    assert_eq!(summary.failed, 0);
    assert_eq!(h.store.len(), summary.chunk_count);

    let stored = h
        .store
        .query_by_equality(RecordField::DocumentId, "42", 100)
        .await
        .unwrap();
    assert_eq!(stored.len(), summary.chunk_count);
    for (i, record) in stored.iter().enumerate() {
        assert_eq!(record.chunk_index, Some(i as i64));
        assert_eq!(record.file_name, "guide.txt");
        assert_eq!(record.id, record_id("42", &record.chunk));
    }
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    h.source
        .insert("7", "guide.txt", "text/plain", long_text().as_bytes());

    let first = h.ingestor.ingest("7").await.unwrap();
    let ids_after_first = h.store.ids();
    let second = h.ingestor.ingest("7").await.unwrap();

    assert_eq!(first.record_ids, second.record_ids);
    assert_eq!(h.store.ids(), ids_after_first);
    assert_eq!(h.store.len(), first.chunk_count);
}

#[tokio::test]
async fn test_same_text_different_documents_do_not_collide() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    let text = long_text();
    h.source.insert("a", "a.txt", "text/plain", text.as_bytes());
    h.source.insert("b", "b.txt", "text/plain", text.as_bytes());

    let a = h.ingestor.ingest("a").await.unwrap();
    let b = h.ingestor.ingest("b").await.unwrap();
    assert_eq!(h.store.len(), a.chunk_count + b.chunk_count);
}

#[tokio::test]
async fn test_short_document_is_single_chunk() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    h.source
        .insert("s", "note.html", "text/html", b"<p>Hi.</p>");

    let summary = h.ingestor.ingest("s").await.unwrap();
    assert_eq!(summary.chunk_count, 1);
    assert_eq!(summary.preview, "Hi.");
}

#[tokio::test]
async fn test_missing_document() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    let err = h.ingestor.ingest("nope").await.unwrap_err();
    assert_eq!(err.stage(), "source-not-found");
}

#[tokio::test]
async fn test_disallowed_extension_is_unsupported_format() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    h.source.insert("img", "photo.png", "image/png", b"\x89PNG");
    let err = h.ingestor.ingest("img").await.unwrap_err();
    assert_eq!(err.stage(), "unsupported-format");
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_generic_mime_is_resolved_from_extension() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    h.source.insert(
        "g",
        "readme.txt",
        "application/octet-stream",
        b"Plain text stored without a content type.",
    );
    let summary = h.ingestor.ingest("g").await.unwrap();
    assert_eq!(summary.mime_type, "text/plain");
}

#[tokio::test]
async fn test_too_large() {
    let source = Arc::new(InMemorySource::new());
    source.insert("big", "big.txt", "text/plain", &vec![b'a'; 2048]);
    let ingestor = Ingestor::new(
        source,
        Arc::new(LetterEmbedder::new()),
        Arc::new(InMemoryVectorStore::new()),
        IngestSettings {
            max_file_bytes: 1024,
            ..IngestSettings::default()
        },
    )
    .unwrap();
    let err = ingestor.ingest("big").await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::SourceTooLarge {
            size: 2048,
            limit: 1024,
            ..
        }
    ));
    assert_eq!(err.stage(), "source-too-large");
}

#[tokio::test]
async fn test_empty_document_fails_extraction() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    h.source.insert("e", "empty.txt", "text/plain", b"");
    let err = h.ingestor.ingest("e").await.unwrap_err();
    assert_eq!(err.stage(), "extraction-failed");
    assert!(matches!(
        err,
        IngestError::Extraction(docingest::extract::ExtractError::EmptyInput)
    ));
}

#[tokio::test]
async fn test_only_tiny_chunks_is_chunking_produced_empty() {
    let source = Arc::new(InMemorySource::new());
    // Every window is whitespace padding around a few letters.
    let text = format!("ab{}cd{}ef", " ".repeat(40), " ".repeat(40));
    source.insert("t", "tiny.txt", "text/plain", text.as_bytes());
    let ingestor = Ingestor::new(
        source,
        Arc::new(LetterEmbedder::new()),
        Arc::new(InMemoryVectorStore::new()),
        IngestSettings {
            chunker: ChunkerConfig {
                chunk_size: 20,
                overlap: 5,
                min_chunk_chars: 10,
            },
            ..IngestSettings::default()
        },
    )
    .unwrap();
    let err = ingestor.ingest("t").await.unwrap_err();
    assert_eq!(err.stage(), "chunking-produced-empty");
}

#[tokio::test]
async fn test_embedding_failure_rolls_back() {
    let h = harness(
        LetterEmbedder::failing_from(2),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    h.source
        .insert("r", "guide.txt", "text/plain", long_text().as_bytes());

    let err = h.ingestor.ingest("r").await.unwrap_err();
    assert_eq!(err.stage(), "embedding-failed");
    assert!(matches!(
        err,
        IngestError::Embedding {
            index: 2,
            rolled_back: 2,
            ..
        }
    ));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_failed_reingest_leaves_existing_records() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    h.source
        .insert("k", "guide.txt", "text/plain", long_text().as_bytes());
    let first = h.ingestor.ingest("k").await.unwrap();
    assert!(first.chunk_count > 3);
    let ids_before = h.store.ids();

    let flaky = Ingestor::new(
        h.source.clone(),
        Arc::new(LetterEmbedder::failing_from(3)),
        h.store.clone(),
        settings(WritePolicy::AllOrNothing),
    )
    .unwrap();
    let err = flaky.ingest("k").await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Embedding {
            index: 3,
            rolled_back: 0,
            ..
        }
    ));
    assert_eq!(h.store.ids(), ids_before);
}

#[tokio::test]
async fn test_write_failure_rolls_back() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::failing_after(1),
        WritePolicy::AllOrNothing,
    );
    h.source
        .insert("w", "guide.txt", "text/plain", long_text().as_bytes());

    let err = h.ingestor.ingest("w").await.unwrap_err();
    assert_eq!(err.stage(), "upsert-failed");
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_best_effort_keeps_written_chunks() {
    let h = harness(
        LetterEmbedder::failing_from(3),
        InMemoryVectorStore::new(),
        WritePolicy::BestEffort,
    );
    h.source
        .insert("b", "guide.txt", "text/plain", long_text().as_bytes());

    let summary = h.ingestor.ingest("b").await.unwrap();
    assert_eq!(summary.written, 3);
    assert_eq!(summary.failed, summary.chunk_count - 3);
    assert_eq!(h.store.len(), 3);
}

#[tokio::test]
async fn test_best_effort_with_nothing_written_fails() {
    let h = harness(
        LetterEmbedder::failing_from(0),
        InMemoryVectorStore::new(),
        WritePolicy::BestEffort,
    );
    h.source
        .insert("n", "guide.txt", "text/plain", long_text().as_bytes());

    let err = h.ingestor.ingest("n").await.unwrap_err();
    assert_eq!(err.stage(), "embedding-failed");
}

#[tokio::test]
async fn test_ingest_raw_bypasses_source() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    let summary = h
        .ingestor
        .ingest_raw(RawDocument {
            document_id: "raw".to_string(),
            file_name: "inline.html".to_string(),
            mime_type: "text/html; charset=utf-8".to_string(),
            bytes: b"<h1>Inline</h1><p>Uploaded without storage.</p>".to_vec(),
        })
        .await
        .unwrap();
    assert_eq!(summary.chunk_count, 1);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_extraction_timeout() {
    let source = Arc::new(InMemorySource::new());
    let ingestor = Ingestor::new(
        source,
        Arc::new(LetterEmbedder::new()),
        Arc::new(InMemoryVectorStore::new()),
        IngestSettings {
            extract_timeout: Duration::from_nanos(1),
            ..IngestSettings::default()
        },
    )
    .unwrap();
    let big: String = "word ".repeat(400_000);
    let result = ingestor
        .ingest_raw(RawDocument {
            document_id: "slow".to_string(),
            file_name: "slow.html".to_string(),
            mime_type: "text/html".to_string(),
            bytes: format!("<p>{}</p>", big).into_bytes(),
        })
        .await;
    // A 1ns budget is exhausted before the blocking task can report back.
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Extraction(docingest::extract::ExtractError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_ensure_schema_idempotent() {
    let h = harness(
        LetterEmbedder::new(),
        InMemoryVectorStore::new(),
        WritePolicy::AllOrNothing,
    );
    assert_eq!(h.ingestor.ensure_schema().await.unwrap(), SchemaStatus::Created);
    assert_eq!(
        h.ingestor.ensure_schema().await.unwrap(),
        SchemaStatus::AlreadyExists
    );
}

#[test]
fn test_invalid_chunker_settings_rejected() {
    let result = Ingestor::new(
        Arc::new(InMemorySource::new()),
        Arc::new(LetterEmbedder::new()),
        Arc::new(InMemoryVectorStore::new()),
        IngestSettings {
            chunker: ChunkerConfig {
                chunk_size: 100,
                overlap: 100,
                min_chunk_chars: 10,
            },
            ..IngestSettings::default()
        },
    );
    assert!(matches!(result, Err(IngestError::InvalidSettings(_))));
}
