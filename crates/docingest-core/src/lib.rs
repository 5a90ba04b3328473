//! # docingest core
//!
//! Runtime-agnostic logic for the document ingestion pipeline: data models,
//! the overlapping text chunker, deterministic record identity, and the
//! traits behind which the embedding model, the vector store, and the
//! document byte store live.
//!
//! This crate contains no HTTP client, filesystem I/O, or async runtime.
//! Concrete collaborators (Weaviate, Hugging Face, the local file store)
//! live in the `docingest` app crate; in-memory doubles live here.

pub mod chunk;
pub mod embedding;
pub mod identity;
pub mod models;
pub mod source;
pub mod store;
pub mod upsert;
