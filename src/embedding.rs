//! HTTP embedding clients.
//!
//! Concrete [`Embedder`] implementations:
//! - **[`FeatureExtractionEmbedder`]**: Hugging Face inference API
//!   (`POST {url}/models/{model}`) or any endpoint taking `{"input": text}`.
//! - **[`OpenAIEmbedder`]**: `POST {url}/v1/embeddings`.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama instance.
//! - **[`DisabledEmbedder`]**: fails every call.
//!
//! Each call embeds one text and is bounded by the configured timeout.
//! There are no retries: a failed call is returned to the caller as a typed
//! [`EmbeddingError`].
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use docingest::config::EmbeddingConfig;
//! # use docingest::embedding::create_embedder;
//! let mut config = EmbeddingConfig::default();
//! config.provider = "disabled".to_string();
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use docingest_core::embedding::{check_dims, Embedder, EmbeddingError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::{api_key_from_env, EmbeddingConfig};

/// Build the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledEmbedder));
    }

    let base = config
        .base_url()
        .with_context(|| format!("embedding.url required for provider '{}'", config.provider))?;
    let api_key = api_key_from_env(config.api_key_env.as_deref());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("Failed to build embedding HTTP client")?;

    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "huggingface" => Arc::new(FeatureExtractionEmbedder {
            client,
            endpoint: format!("{}/models/{}", base, config.model),
            input_key: "inputs",
            model: config.model.clone(),
            dims: config.dims,
            api_key,
        }),
        "http" => Arc::new(FeatureExtractionEmbedder {
            client,
            endpoint: base,
            input_key: "input",
            model: config.model.clone(),
            dims: config.dims,
            api_key,
        }),
        "openai" => {
            let Some(api_key) = api_key else {
                bail!(
                    "{} environment variable not set",
                    config.api_key_env.as_deref().unwrap_or("embedding.api_key_env")
                );
            };
            Arc::new(OpenAIEmbedder {
                client,
                endpoint: format!("{}/v1/embeddings", base),
                model: config.model.clone(),
                dims: config.dims,
                api_key,
            })
        }
        "ollama" => Arc::new(OllamaEmbedder {
            client,
            endpoint: format!("{}/api/embed", base),
            model: config.model.clone(),
            dims: config.dims,
        }),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(embedder)
}

// ============ Disabled ============

/// Fails every call with [`EmbeddingError::Disabled`].
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> Option<usize> {
        None
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

// ============ Feature extraction (Hugging Face / generic HTTP) ============

/// Feature-extraction endpoint returning either a flat vector or a
/// batch of vectors.
pub struct FeatureExtractionEmbedder {
    client: reqwest::Client,
    endpoint: String,
    /// `"inputs"` for Hugging Face, `"input"` for generic endpoints.
    input_key: &'static str,
    model: String,
    dims: Option<usize>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureResponse {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
}

impl FeatureResponse {
    fn into_vector(self) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            FeatureResponse::Flat(v) => Ok(v),
            FeatureResponse::Nested(rows) => rows
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::UnexpectedShape("empty batch".to_string())),
        }
    }
}

#[async_trait]
impl Embedder for FeatureExtractionEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> Option<usize> {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut body = serde_json::Map::new();
        body.insert(self.input_key.to_string(), text.into());
        let body = serde_json::Value::Object(body);
        let response: FeatureResponse =
            post_json(&self.client, &self.endpoint, self.api_key.as_deref(), &body).await?;
        check_dims(response.into_vector()?, self.dims)
    }
}

// ============ OpenAI ============

pub struct OpenAIEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: Option<usize>,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> Option<usize> {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = serde_json::json!({ "model": self.model, "input": text });
        let response: OpenAIResponse =
            post_json(&self.client, &self.endpoint, Some(&self.api_key), &body).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::UnexpectedShape("missing data[0]".to_string()))?;
        check_dims(vector, self.dims)
    }
}

// ============ Ollama ============

/// Local Ollama instance; requires the model to be pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> Option<usize> {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = serde_json::json!({ "model": self.model, "input": text });
        let response: OllamaResponse = post_json(&self.client, &self.endpoint, None, &body)
            .await
            .map_err(|e| match e {
                EmbeddingError::Network(msg) => EmbeddingError::Network(format!(
                    "is Ollama running at {}? {}",
                    self.endpoint, msg
                )),
                other => other,
            })?;
        let vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::UnexpectedShape("missing embeddings[0]".to_string()))?;
        check_dims(vector, self.dims)
    }
}

/// POST a JSON body and decode a successful response as `T`.
async fn post_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &serde_json::Value,
) -> Result<T, EmbeddingError> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| EmbeddingError::Network(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| EmbeddingError::Network(e.to_string()))?;
    debug!(url, bytes = bytes.len(), "embedding response received");
    serde_json::from_slice(&bytes).map_err(|e| EmbeddingError::UnexpectedShape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_response_flat() {
        let parsed: FeatureResponse = serde_json::from_str("[0.1, 0.2, 0.3]").unwrap();
        assert_eq!(parsed.into_vector().unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_feature_response_nested_takes_first_row() {
        let parsed: FeatureResponse = serde_json::from_str("[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(parsed.into_vector().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_feature_response_rejects_objects() {
        assert!(serde_json::from_str::<FeatureResponse>(r#"{"error": "loading"}"#).is_err());
        assert!(serde_json::from_str::<FeatureResponse>(r#"["a", "b"]"#).is_err());
    }

    #[test]
    fn test_feature_response_empty_batch() {
        let parsed = FeatureResponse::Nested(vec![]);
        assert_eq!(parsed.into_vector().unwrap_err().reason(), "unexpected-shape");
    }

    #[tokio::test]
    async fn test_disabled_embedder() {
        let mut config = EmbeddingConfig::default();
        config.provider = "disabled".to_string();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        assert_eq!(
            embedder.embed("hello").await.unwrap_err(),
            EmbeddingError::Disabled
        );
    }

    #[test]
    fn test_openai_requires_key() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: Some("DOCINGEST_TEST_UNSET_OPENAI_KEY".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_http_requires_url() {
        let config = EmbeddingConfig {
            provider: "http".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
