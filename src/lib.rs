//! # docingest
//!
//! Document ingestion pipeline for retrieval-augmented generation.
//!
//! An uploaded document (PDF, Word, plain text or HTML) is fetched by id,
//! converted to plain text, split into overlapping chunks, embedded one
//! chunk at a time, and written to a vector store under deterministic ids,
//! so re-ingesting an unchanged document overwrites its records in place.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌─────────┐   ┌──────────┐   ┌──────────┐
//! │  Document  │──▶│  Extract  │──▶│  Chunk  │──▶│  Embed   │──▶│ Weaviate │
//! │   source   │   │ pdf/docx/ │   │ overlap │   │ HF/OpenAI│   │  upsert  │
//! │ (fs / mem) │   │ txt/html  │   │ + snap  │   │ /Ollama  │   │          │
//! └────────────┘   └───────────┘   └─────────┘   └──────────┘   └──────────┘
//! ```
//!
//! Runtime-agnostic pieces (chunker, record identity, the `Embedder`,
//! `VectorStore` and `DocumentSource` traits, the upsert loop) live in the
//! `docingest-core` crate. This crate supplies the concrete I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction per MIME type |
//! | [`source_fs`] | Filesystem document source |
//! | [`embedding`] | HTTP embedding clients |
//! | [`weaviate`] | Weaviate vector store |
//! | [`ingest`] | Pipeline orchestration |
//! | [`commands`] | CLI command implementations |
//! | [`logging`] | Tracing subscriber setup |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod source_fs;
pub mod weaviate;
