//! Embedding model abstraction.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements
//! and the [`EmbeddingError`] it fails with. Concrete HTTP clients
//! (Hugging Face, OpenAI, Ollama, generic bearer endpoints) live in the
//! `docingest` app crate.

use async_trait::async_trait;
use thiserror::Error;

/// Failure to turn one chunk of text into a vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding endpoint returned {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("embedding request failed: {0}")]
    Network(String),
    #[error("unexpected embedding response shape: {0}")]
    UnexpectedShape(String),
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Stable tag for user-visible output.
    pub fn reason(&self) -> &'static str {
        match self {
            EmbeddingError::Disabled => "disabled",
            EmbeddingError::HttpStatus { .. } => "http-status",
            EmbeddingError::Network(_) => "network",
            EmbeddingError::UnexpectedShape(_) => "unexpected-shape",
            EmbeddingError::DimensionMismatch { .. } => "dimension-mismatch",
        }
    }
}

/// An embedding backend.
///
/// One call embeds one text. Implementations must not retry internally: a
/// failed call is terminal for that chunk and is reported to the caller.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the expected vector length, when known up front. Vectors of
    /// any other length are rejected before they are written.
    fn dims(&self) -> Option<usize>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Rejects empty vectors and, when `expected` is set, vectors of the wrong length.
pub fn check_dims(vector: Vec<f32>, expected: Option<usize>) -> Result<Vec<f32>, EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::UnexpectedShape(
            "empty vector".to_string(),
        ));
    }
    match expected {
        Some(expected) if expected != vector.len() => Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(vector),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
