//! Deterministic identity for vector records.
//!
//! A record id is a name-based (v5) UUID over `document_id + chunk_text` in
//! the DNS namespace, so re-ingesting unchanged content overwrites the same
//! records instead of adding new ones. The byte layout of the name (plain
//! concatenation, no separator) must stay stable: changing it orphans every
//! record already in the store.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for record ids (`6ba7b810-9dad-11d1-80b4-00c04fd430c8`).
pub const RECORD_NAMESPACE: Uuid = Uuid::NAMESPACE_DNS;

/// Derive the vector-store id for a chunk of a document.
pub fn record_id(document_id: &str, chunk_text: &str) -> Uuid {
    let mut name = String::with_capacity(document_id.len() + chunk_text.len());
    name.push_str(document_id);
    name.push_str(chunk_text);
    Uuid::new_v5(&RECORD_NAMESPACE, name.as_bytes())
}

/// SHA-256 hex digest of a chunk's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
