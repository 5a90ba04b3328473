//! Command implementations behind the `docingest` CLI.
//!
//! Each `run_*` function builds the collaborators it needs from the
//! configuration, performs one command, and prints its result to stdout.
//! Errors propagate to `main`, which reports them once.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use docingest_core::chunk::chunk_text;
use docingest_core::embedding::Embedder;
use docingest_core::identity::record_id;
use docingest_core::source::DocumentSource;
use docingest_core::store::{RecordField, SchemaStatus, VectorStore};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::{extract_text, mime_for_path, validate_file_size};
use crate::ingest::{preview, IngestSettings, IngestSummary, Ingestor};
use crate::source_fs::FsDocumentSource;
use crate::weaviate::WeaviateStore;

fn build_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    Ok(Arc::new(WeaviateStore::from_config(&config.vector_store)?))
}

fn build_source(config: &Config) -> FsDocumentSource {
    FsDocumentSource::new(&config.source.root, config.ingest.max_file_bytes)
}

fn build_ingestor(config: &Config) -> Result<Ingestor> {
    let embedder: Arc<dyn Embedder> = create_embedder(&config.embedding)?;
    let ingestor = Ingestor::new(
        Arc::new(build_source(config)),
        embedder,
        build_store(config)?,
        IngestSettings::from_config(config)?,
    )?;
    Ok(ingestor)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Default document id for an upload: the first 12 hex chars of its SHA-256.
pub fn default_document_id(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..12].to_string()
}

pub async fn run_init(config: &Config) -> Result<()> {
    let store = build_store(config)?;
    let status = store
        .ensure_schema()
        .await
        .with_context(|| format!("Failed to set up class {}", config.vector_store.class_name))?;
    match status {
        SchemaStatus::Created => println!(
            "Schema created: {} at {}",
            config.vector_store.class_name, config.vector_store.url
        ),
        SchemaStatus::AlreadyExists => println!(
            "Schema already exists: {} at {}",
            config.vector_store.class_name, config.vector_store.url
        ),
    }

    let embedder = create_embedder(&config.embedding)?;
    match embedder.dims() {
        Some(dims) => println!("Embedding model: {} ({} dims)", embedder.model_name(), dims),
        None => println!("Embedding model: {}", embedder.model_name()),
    }
    Ok(())
}

pub async fn run_upload(config: &Config, path: &Path, id: Option<String>) -> Result<()> {
    let bytes = read_file(path)?;
    if !validate_file_size(bytes.len() as u64, config.ingest.max_file_bytes) {
        bail!(
            "{} is {} bytes; uploads must be between 1 and {} bytes",
            path.display(),
            bytes.len(),
            config.ingest.max_file_bytes
        );
    }
    if mime_for_path(path).is_none() {
        bail!(
            "Unsupported file type: {} (allowed: {})",
            path.display(),
            config.ingest.allowed_extensions.join(", ")
        );
    }

    let document_id = id.unwrap_or_else(|| default_document_id(&bytes));
    let stored_at = build_source(config)
        .put(&document_id, &file_name_of(path), &bytes)
        .await?;

    println!("upload {}", document_id);
    println!("  file: {}", file_name_of(path));
    println!("  bytes: {}", bytes.len());
    println!("  stored at: {}", stored_at);
    println!("ok");
    Ok(())
}

fn print_summary(summary: &IngestSummary) {
    println!("ingest {}", summary.document_id);
    println!("  file: {} ({})", summary.file_name, summary.mime_type);
    println!("  text length: {} chars", summary.text_length);
    println!("  chunks: {}", summary.chunk_count);
    println!("  written: {}", summary.written);
    if summary.failed > 0 {
        println!("  failed: {}", summary.failed);
    }
    println!("  preview: {}", summary.preview.replace('\n', " "));
    println!("ok");
}

pub async fn run_ingest(config: &Config, ids: Vec<String>, all: bool) -> Result<()> {
    let ingestor = build_ingestor(config)?;
    let ids = if all {
        build_source(config).list().await?
    } else {
        ids
    };
    if ids.is_empty() {
        bail!("No documents to ingest. Pass one or more ids, or --all.");
    }

    let mut failures = 0usize;
    for id in &ids {
        match ingestor.ingest(id).await {
            Ok(summary) => print_summary(&summary),
            Err(e) => {
                failures += 1;
                println!("ingest {}", id);
                println!("  failed [{}]: {}", e.stage(), e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} documents failed to ingest", failures, ids.len());
    }
    Ok(())
}

fn extract_file(path: &Path, mime: Option<&str>) -> Result<String> {
    let mime = match mime {
        Some(m) => m.to_string(),
        None => mime_for_path(path)
            .with_context(|| format!("Cannot infer content type for {}", path.display()))?
            .to_string(),
    };
    let bytes = read_file(path)?;
    let text = extract_text(&bytes, &mime)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    Ok(text)
}

pub fn run_extract(path: &Path, mime: Option<&str>) -> Result<()> {
    println!("{}", extract_file(path, mime)?);
    Ok(())
}

pub fn run_chunk(config: &Config, path: &Path, document_id: Option<String>) -> Result<()> {
    let text = extract_file(path, None)?;
    let chunks = chunk_text(&text, &config.chunking.chunker())?;
    let document_id = document_id.unwrap_or_else(|| file_name_of(path));

    println!("chunk {}", path.display());
    println!("  document id: {}", document_id);
    println!("  text length: {} chars", text.chars().count());
    println!("  chunks: {}", chunks.len());
    for chunk in &chunks {
        println!(
            "  [{}] {} ({} chars) {}",
            chunk.index,
            record_id(&document_id, &chunk.text),
            chunk.text.chars().count(),
            preview(&chunk.text, 60).replace('\n', " ")
        );
    }
    Ok(())
}

pub async fn run_chunks(config: &Config, document_id: &str) -> Result<()> {
    let store = build_store(config)?;
    let records = store
        .query_by_equality(
            RecordField::DocumentId,
            document_id,
            config.vector_store.query_limit,
        )
        .await?;

    if records.is_empty() {
        println!("No chunks stored for document {}.", document_id);
        return Ok(());
    }
    for record in &records {
        println!(
            "{}. [{}] {} ({})",
            record.chunk_index.unwrap_or(-1),
            record.id,
            record.file_name,
            record.chunk.chars().count()
        );
        println!("    {}", preview(&record.chunk, 120).replace('\n', " "));
    }
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Search query must not be empty");
    }
    let embedder = create_embedder(&config.embedding)?;
    let store = build_store(config)?;

    let vector = embedder
        .embed(query)
        .await
        .context("Failed to embed query")?;
    let hits = store.search_near(&vector, limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} #{} ({})",
            rank + 1,
            hit.distance,
            hit.record.file_name,
            hit.record.chunk_index.unwrap_or(-1),
            hit.record.document_id
        );
        println!("    {}", preview(&hit.record.chunk, 120).replace('\n', " "));
    }
    Ok(())
}

pub async fn run_purge(config: &Config, document: Option<String>, all: bool) -> Result<()> {
    let store = build_store(config)?;
    let deleted = match (document, all) {
        (_, true) => store.delete_all().await?,
        (Some(id), false) => store.delete_where(RecordField::DocumentId, &id).await?,
        (None, false) => bail!("Pass --document <ID> or --all"),
    };
    println!("Deleted {} records.", deleted);
    Ok(())
}
