//! Sliding-window text chunker with sentence snapping.
//!
//! Splits extracted document text into overlapping [`Chunk`]s suitable for
//! embedding. A window of `chunk_size` characters advances across the text;
//! each window after the first starts `overlap` characters before the end of
//! the previous chunk, so consecutive chunks share exactly `overlap`
//! characters of raw text and no text is skipped.
//!
//! Windows that stop short of the end of the text are cut after the last
//! `.`, `!` or `?` found in their final 30%, when there is one. Lengths are
//! counted in `char`s, never bytes.
//!
//! Chunks whose trimmed length is at most `min_chunk_chars` are dropped.
//! Text that already fits in one window is returned as a single chunk.

use thiserror::Error;

use crate::identity::content_hash;
use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;
pub const DEFAULT_MIN_CHUNK_CHARS: usize = 10;

/// A sentence boundary must sit past 7/10 of the window to be used.
const SNAP_NUMERATOR: usize = 7;
const SNAP_DENOMINATOR: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap { chunk_size: usize, overlap: usize },
}

/// Window geometry for [`chunk_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub overlap: usize,
    /// Chunks with a trimmed length at or below this are discarded.
    pub min_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_chunk_chars: DEFAULT_MIN_CHUNK_CHARS,
        }
    }
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        let config = Self {
            chunk_size,
            overlap,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// The stride must be positive or the window never advances.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if self.overlap >= self.chunk_size {
            return Err(ChunkError::InvalidOverlap {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// Split text into overlapping chunks with contiguous indices from 0.
///
/// Returns an empty vector for empty or whitespace-only input.
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Result<Vec<Chunk>, ChunkError> {
    let pieces = split_text(text, config)?;
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            index,
            hash: content_hash(&text),
            text,
        })
        .collect())
}

/// The string-level chunker behind [`chunk_text`].
pub fn split_text(text: &str, config: &ChunkerConfig) -> Result<Vec<String>, ChunkError> {
    config.validate()?;

    let clean = text.trim();
    if clean.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = clean.chars().collect();
    let total = chars.len();
    if total <= config.chunk_size {
        return Ok(vec![clean.to_string()]);
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + config.chunk_size).min(total);
        let mut cut = end;
        if end < total {
            if let Some(len) = sentence_cut(&chars[start..end], config.overlap) {
                cut = start + len;
            }
        }

        let piece: String = chars[start..cut].iter().collect();
        let trimmed = piece.trim();
        if trimmed.chars().count() > config.min_chunk_chars {
            pieces.push(trimmed.to_string());
        }

        if end >= total {
            break;
        }
        // cut - start > overlap for both hard and snapped cuts
        start = cut - config.overlap;
    }

    Ok(pieces)
}

/// Length of the window when cut after its last sentence terminator, if
/// that terminator lies in the final 30% and the cut still advances.
fn sentence_cut(window: &[char], overlap: usize) -> Option<usize> {
    let len = window.len();
    let boundary = window
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?'))?;
    if boundary * SNAP_DENOMINATOR > len * SNAP_NUMERATOR && boundary + 1 > overlap {
        Some(boundary + 1)
    } else {
        None
    }
}
