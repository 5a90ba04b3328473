//! Embed-and-write loop for one document's chunks.
//!
//! Chunks are processed strictly in order: one embedding call, then one
//! write, then the next chunk. Each record's id is derived from
//! `(document_id, chunk text)`, so running the loop twice over unchanged
//! chunks overwrites the same records.
//!
//! What happens when a chunk fails is governed by [`WritePolicy`]:
//!
//! - [`WritePolicy::AllOrNothing`] stops at the first failure and deletes
//!   the records this call created, then returns the error. Records that
//!   were already stored before the call (an unchanged chunk of a
//!   re-ingested document) are overwritten in place and never deleted.
//! - [`WritePolicy::BestEffort`] attempts every chunk and reports a status
//!   per chunk.

use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::embedding::{check_dims, Embedder, EmbeddingError};
use crate::models::{Chunk, EmbeddedChunk, VectorRecord};
use crate::store::{VectorStore, VectorStoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WritePolicy {
    #[default]
    AllOrNothing,
    BestEffort,
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-or-nothing" => Ok(WritePolicy::AllOrNothing),
            "best-effort" => Ok(WritePolicy::BestEffort),
            other => Err(format!(
                "unknown write policy '{}': expected all-or-nothing or best-effort",
                other
            )),
        }
    }
}

/// Where a chunk failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkFailure {
    Embedding(EmbeddingError),
    Write(VectorStoreError),
}

impl std::fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkFailure::Embedding(e) => write!(f, "embedding: {}", e),
            ChunkFailure::Write(e) => write!(f, "write: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkStatus {
    Written,
    Failed(ChunkFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    pub index: usize,
    pub record_id: Uuid,
    pub status: ChunkStatus,
}

/// Per-chunk result of one upsert call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertReport {
    pub outcomes: Vec<ChunkOutcome>,
}

impl UpsertReport {
    pub fn written(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == ChunkStatus::Written)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.written()
    }

    /// Ids of the records that were written, in chunk order.
    pub fn written_ids(&self) -> Vec<Uuid> {
        self.outcomes
            .iter()
            .filter(|o| o.status == ChunkStatus::Written)
            .map(|o| o.record_id)
            .collect()
    }

    /// The first failure, if any chunk failed.
    pub fn first_failure(&self) -> Option<(usize, &ChunkFailure)> {
        self.outcomes.iter().find_map(|o| match &o.status {
            ChunkStatus::Failed(failure) => Some((o.index, failure)),
            ChunkStatus::Written => None,
        })
    }
}

/// An all-or-nothing upsert that stopped at a failing chunk.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpsertError {
    #[error("chunk {index}: {source} ({rolled_back} new records rolled back)")]
    Embedding {
        index: usize,
        source: EmbeddingError,
        rolled_back: usize,
    },
    #[error("chunk {index}: {source} ({rolled_back} new records rolled back)")]
    Write {
        index: usize,
        source: VectorStoreError,
        rolled_back: usize,
    },
}

/// Identity of the document whose chunks are being written.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRef<'a> {
    pub document_id: &'a str,
    pub file_name: &'a str,
}

/// Embed and write each chunk in order.
///
/// Under [`WritePolicy::AllOrNothing`] each id is checked before its write,
/// and the first failure triggers deletion of the records this call
/// created. Rollback deletes are best effort: a record whose delete fails
/// is left in place and not counted.
#[instrument(skip_all, fields(document_id = doc.document_id, chunks = chunks.len()))]
pub async fn upsert_chunks(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    doc: DocumentRef<'_>,
    chunks: &[Chunk],
    policy: WritePolicy,
) -> Result<UpsertReport, UpsertError> {
    let mut report = UpsertReport::default();
    let mut created: Vec<Uuid> = Vec::new();

    for chunk in chunks {
        let record_id = crate::identity::record_id(doc.document_id, &chunk.text);
        let outcome = match embed_record(embedder, doc, chunk).await {
            Ok(record) => write_record(store, &record, policy, &mut created).await,
            Err(failure) => Err(failure),
        };

        match outcome {
            Ok(()) => {
                debug!(index = chunk.index, %record_id, "chunk written");
                report.outcomes.push(ChunkOutcome {
                    index: chunk.index,
                    record_id,
                    status: ChunkStatus::Written,
                });
            }
            Err(failure) if policy == WritePolicy::AllOrNothing => {
                let rolled_back = roll_back(store, &created).await;
                return Err(match failure {
                    ChunkFailure::Embedding(source) => UpsertError::Embedding {
                        index: chunk.index,
                        source,
                        rolled_back,
                    },
                    ChunkFailure::Write(source) => UpsertError::Write {
                        index: chunk.index,
                        source,
                        rolled_back,
                    },
                });
            }
            Err(failure) => {
                debug!(index = chunk.index, %failure, "chunk failed, continuing");
                report.outcomes.push(ChunkOutcome {
                    index: chunk.index,
                    record_id,
                    status: ChunkStatus::Failed(failure),
                });
            }
        }
    }

    Ok(report)
}

async fn embed_record(
    embedder: &dyn Embedder,
    doc: DocumentRef<'_>,
    chunk: &Chunk,
) -> Result<VectorRecord, ChunkFailure> {
    let vector = embedder
        .embed(&chunk.text)
        .await
        .and_then(|v| check_dims(v, embedder.dims()))
        .map_err(ChunkFailure::Embedding)?;
    debug!(index = chunk.index, dims = vector.len(), "chunk embedded");

    Ok(VectorRecord::from_embedded(EmbeddedChunk {
        document_id: doc.document_id.to_string(),
        file_name: doc.file_name.to_string(),
        chunk: chunk.clone(),
        vector,
    }))
}

/// Write one record. Under [`WritePolicy::AllOrNothing`] the id is recorded
/// in `created` when it was not stored before this write.
async fn write_record(
    store: &dyn VectorStore,
    record: &VectorRecord,
    policy: WritePolicy,
    created: &mut Vec<Uuid>,
) -> Result<(), ChunkFailure> {
    let track = policy == WritePolicy::AllOrNothing;
    let existed = if track {
        store.exists(record.id).await.map_err(ChunkFailure::Write)?
    } else {
        true
    };
    store.upsert(record).await.map_err(ChunkFailure::Write)?;
    if !existed && !created.contains(&record.id) {
        created.push(record.id);
    }
    Ok(())
}

async fn roll_back(store: &dyn VectorStore, ids: &[Uuid]) -> usize {
    let mut deleted = 0;
    for id in ids {
        if store.delete(*id).await.is_ok() {
            deleted += 1;
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_text, ChunkerConfig};
    use crate::store::memory::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as [len, vowels]; fails on the call numbered `fail_on`.
    struct FakeEmbedder {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl FakeEmbedder {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> Option<usize> {
            Some(2)
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_on {
                return Err(EmbeddingError::HttpStatus {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![text.len() as f32, vowels as f32])
        }
    }

    fn sample_chunks() -> Vec<Chunk> {
        let text: String = (0..30)
            .map(|i| format!("Sentence number {} talks about ingestion. ", i))
            .collect();
        chunk_text(&text, &ChunkerConfig::new(200, 40).unwrap()).unwrap()
    }

    const DOC: DocumentRef<'static> = DocumentRef {
        document_id: "42",
        file_name: "notes.txt",
    };

    #[tokio::test]
    async fn test_writes_every_chunk() {
        let store = InMemoryVectorStore::new();
        let chunks = sample_chunks();
        let report = upsert_chunks(
            &FakeEmbedder::new(None),
            &store,
            DOC,
            &chunks,
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap();
        assert_eq!(report.written(), chunks.len());
        assert_eq!(store.len(), chunks.len());
    }

    #[tokio::test]
    async fn test_reingest_produces_same_ids() {
        let store = InMemoryVectorStore::new();
        let chunks = sample_chunks();
        let embedder = FakeEmbedder::new(None);
        let first = upsert_chunks(&embedder, &store, DOC, &chunks, WritePolicy::AllOrNothing)
            .await
            .unwrap();
        let second = upsert_chunks(&embedder, &store, DOC, &chunks, WritePolicy::AllOrNothing)
            .await
            .unwrap();
        assert_eq!(first.written_ids(), second.written_ids());
        assert_eq!(store.len(), chunks.len());
    }

    #[tokio::test]
    async fn test_all_or_nothing_rolls_back_on_embedding_failure() {
        let store = InMemoryVectorStore::new();
        let chunks = sample_chunks();
        assert!(chunks.len() > 3);
        let err = upsert_chunks(
            &FakeEmbedder::new(Some(2)),
            &store,
            DOC,
            &chunks,
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            UpsertError::Embedding {
                index: 2,
                source: EmbeddingError::HttpStatus {
                    status: 503,
                    body: "overloaded".to_string()
                },
                rolled_back: 2,
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_all_or_nothing_rolls_back_on_write_failure() {
        let store = InMemoryVectorStore::failing_after(3);
        let chunks = sample_chunks();
        let err = upsert_chunks(
            &FakeEmbedder::new(None),
            &store,
            DOC,
            &chunks,
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            UpsertError::Write {
                index: 3,
                rolled_back: 3,
                ..
            }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reingest_keeps_existing_records() {
        let store = InMemoryVectorStore::new();
        let chunks = sample_chunks();
        assert!(chunks.len() > 3);
        upsert_chunks(
            &FakeEmbedder::new(None),
            &store,
            DOC,
            &chunks,
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap();
        let before = store.ids();

        let err = upsert_chunks(
            &FakeEmbedder::new(Some(3)),
            &store,
            DOC,
            &chunks,
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            UpsertError::Embedding {
                index: 3,
                rolled_back: 0,
                ..
            }
        ));
        assert_eq!(store.ids(), before);
    }

    #[tokio::test]
    async fn test_rollback_only_removes_new_records() {
        let store = InMemoryVectorStore::new();
        let chunks = sample_chunks();
        assert!(chunks.len() > 4);
        upsert_chunks(
            &FakeEmbedder::new(None),
            &store,
            DOC,
            &chunks[..2],
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap();
        let before = store.ids();

        // Chunks 0 and 1 already exist, 2 and 3 are new, 4 fails.
        let err = upsert_chunks(
            &FakeEmbedder::new(Some(4)),
            &store,
            DOC,
            &chunks,
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            UpsertError::Embedding {
                index: 4,
                rolled_back: 2,
                ..
            }
        ));
        assert_eq!(store.ids(), before);
    }

    #[tokio::test]
    async fn test_duplicate_chunk_text_rolls_back_once() {
        let store = InMemoryVectorStore::new();
        let chunk = |index: usize, text: &str| Chunk {
            index,
            text: text.to_string(),
            hash: String::new(),
        };
        let chunks = vec![
            chunk(0, "Repeated boilerplate footer."),
            chunk(1, "Repeated boilerplate footer."),
            chunk(2, "Something else entirely."),
        ];
        let err = upsert_chunks(
            &FakeEmbedder::new(Some(2)),
            &store,
            DOC,
            &chunks,
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            UpsertError::Embedding {
                index: 2,
                rolled_back: 1,
                ..
            }
        ));
        assert!(store.is_empty());
    }

    /// Claims two dimensions but returns three.
    struct OversizedEmbedder;

    #[async_trait]
    impl Embedder for OversizedEmbedder {
        fn model_name(&self) -> &str {
            "oversized"
        }
        fn dims(&self) -> Option<usize> {
            Some(2)
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 2.0, 3.0])
        }
    }

    #[tokio::test]
    async fn test_vector_length_must_match_embedder_dims() {
        let store = InMemoryVectorStore::new();
        let chunks = sample_chunks();
        let err = upsert_chunks(
            &OversizedEmbedder,
            &store,
            DOC,
            &chunks,
            WritePolicy::AllOrNothing,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            UpsertError::Embedding {
                index: 0,
                source: EmbeddingError::DimensionMismatch {
                    expected: 2,
                    actual: 3
                },
                rolled_back: 0,
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_best_effort_reports_per_chunk() {
        let store = InMemoryVectorStore::new();
        let chunks = sample_chunks();
        let report = upsert_chunks(
            &FakeEmbedder::new(Some(1)),
            &store,
            DOC,
            &chunks,
            WritePolicy::BestEffort,
        )
        .await
        .unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.written(), chunks.len() - 1);
        let (index, failure) = report.first_failure().unwrap();
        assert_eq!(index, 1);
        assert!(matches!(failure, ChunkFailure::Embedding(_)));
        assert_eq!(store.len(), chunks.len() - 1);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("best-effort".parse::<WritePolicy>(), Ok(WritePolicy::BestEffort));
        assert_eq!("all-or-nothing".parse::<WritePolicy>(), Ok(WritePolicy::AllOrNothing));
        assert!("sometimes".parse::<WritePolicy>().is_err());
    }
}
