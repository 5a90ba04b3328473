//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//! [`load_config`] parses and validates a file, [`Config::default`] gives
//! the configuration used when no file exists.

use anyhow::{Context, Result};
use docingest_core::chunk::ChunkerConfig;
use docingest_core::upsert::WritePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Path probed when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/docingest.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_chars: default_min_chunk_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            min_chunk_chars: self.min_chunk_chars,
        }
    }
}

fn default_chunk_size() -> usize {
    docingest_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    docingest_core::chunk::DEFAULT_OVERLAP
}
fn default_min_chunk_chars() -> usize {
    docingest_core::chunk::DEFAULT_MIN_CHUNK_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_write_policy")]
    pub write_policy: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            allowed_extensions: default_allowed_extensions(),
            extract_timeout_secs: default_extract_timeout_secs(),
            preview_chars: default_preview_chars(),
            write_policy: default_write_policy(),
        }
    }
}

impl IngestConfig {
    /// Parsed write policy; only fails on a config that skipped validation.
    pub fn policy(&self) -> Result<WritePolicy> {
        self.write_policy
            .parse::<WritePolicy>()
            .map_err(anyhow::Error::msg)
    }
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "doc", "docx", "txt", "html", "htm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_extract_timeout_secs() -> u64 {
    30
}
fn default_preview_chars() -> usize {
    1000
}
fn default_write_policy() -> String {
    "all-or-nothing".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_root")]
    pub root: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: default_source_root(),
        }
    }
}

fn default_source_root() -> PathBuf {
    PathBuf::from("./data/documents")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL; falls back to the provider's public endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: Option<usize>,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            url: None,
            dims: default_dims(),
            api_key_env: default_embedding_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Configured URL, or the provider's default endpoint.
    pub fn base_url(&self) -> Option<String> {
        let fallback = match self.provider.as_str() {
            "huggingface" => Some("https://api-inference.huggingface.co"),
            "openai" => Some("https://api.openai.com"),
            "ollama" => Some("http://localhost:11434"),
            _ => None,
        };
        self.url
            .clone()
            .or_else(|| fallback.map(str::to_string))
            .map(|u| u.trim_end_matches('/').to_string())
    }
}

pub const PROVIDERS: &[&str] = &["huggingface", "http", "openai", "ollama", "disabled"];

fn default_provider() -> String {
    "huggingface".to_string()
}
fn default_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_dims() -> Option<usize> {
    Some(384)
}
fn default_embedding_key_env() -> Option<String> {
    Some("HUGGINGFACE_API_KEY".to_string())
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_class_name")]
    pub class_name: String,
    #[serde(default = "default_store_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            class_name: default_class_name(),
            api_key_env: default_store_key_env(),
            timeout_secs: default_timeout_secs(),
            query_limit: default_query_limit(),
        }
    }
}

fn default_store_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_class_name() -> String {
    "DocumentChunk".to_string()
}
fn default_store_key_env() -> Option<String> {
    Some("WEAVIATE_API_KEY".to_string())
}
fn default_query_limit() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

/// Read an API key from the environment variable named by `var`, if any.
pub fn api_key_from_env(var: Option<&str>) -> Option<String> {
    var.and_then(|name| std::env::var(name).ok())
        .filter(|key| !key.trim().is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load `path` when given, otherwise the default path if it exists,
/// otherwise the built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_config(default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    config
        .chunking
        .chunker()
        .validate()
        .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

    // Validate ingest
    if config.ingest.max_file_bytes == 0 {
        anyhow::bail!("ingest.max_file_bytes must be > 0");
    }
    if config.ingest.extract_timeout_secs == 0 {
        anyhow::bail!("ingest.extract_timeout_secs must be > 0");
    }
    config.ingest.policy().context("ingest.write_policy")?;

    // Validate embedding
    if !PROVIDERS.contains(&config.embedding.provider.as_str()) {
        anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be one of: {}.",
            config.embedding.provider,
            PROVIDERS.join(", ")
        );
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }
    if config.embedding.is_enabled() && config.embedding.base_url().is_none() {
        anyhow::bail!(
            "embedding.url must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    // Validate vector store
    let class = &config.vector_store.class_name;
    if !crate::weaviate::is_valid_class_name(class) {
        anyhow::bail!(
            "vector_store.class_name must be an uppercase letter followed by letters, digits or '_', got '{}'",
            class
        );
    }
    if config.vector_store.query_limit == 0 {
        anyhow::bail!("vector_store.query_limit must be >= 1");
    }

    Ok(())
}
