//! Weaviate [`VectorStore`] over the REST and GraphQL APIs.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | schema check / create | `GET /v1/schema/{class}`, `POST /v1/schema` |
//! | upsert | `POST /v1/batch/objects` (one object, explicit id) |
//! | exists by id | `HEAD /v1/objects/{class}/{id}` |
//! | delete by id | `DELETE /v1/objects/{class}/{id}` |
//! | equality query, similarity search | `POST /v1/graphql` |
//! | bulk delete | `DELETE /v1/batch/objects` |
//!
//! Objects are stored with `vectorizer: "none"`; vectors always come from
//! the configured embedder.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use docingest_core::models::{RecordProperties, SearchHit, StoredRecord, VectorRecord};
use docingest_core::store::{RecordField, SchemaStatus, VectorStore, VectorStoreError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{api_key_from_env, VectorStoreConfig};

pub struct WeaviateStore {
    client: Client,
    base_url: String,
    class_name: String,
}

impl WeaviateStore {
    pub fn new(
        base_url: &str,
        class_name: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        if !is_valid_class_name(class_name) {
            anyhow::bail!("invalid Weaviate class name '{}'", class_name);
        }
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                    .context("invalid Weaviate API key")?,
            );
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Weaviate HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            class_name: class_name.to_string(),
        })
    }

    pub fn from_config(config: &VectorStoreConfig) -> anyhow::Result<Self> {
        let api_key = api_key_from_env(config.api_key_env.as_deref());
        Self::new(
            &config.url,
            &config.class_name,
            api_key.as_deref(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, mapping transport failures and non-2xx statuses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, VectorStoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response).await)
        }
    }

    async fn graphql<T: DeserializeOwned>(&self, query: String) -> Result<T, VectorStoreError> {
        let request = self
            .client
            .post(self.url("/v1/graphql"))
            .json(&GraphQlRequest { query });
        let response: GraphQlResponse<T> = decode(self.send(request).await?).await?;
        if let Some(error) = response.errors.into_iter().next() {
            return Err(VectorStoreError::Decode(format!(
                "GraphQL error: {}",
                error.message
            )));
        }
        response
            .data
            .ok_or_else(|| VectorStoreError::Decode("GraphQL response without data".to_string()))
    }

    /// Objects of this class from a `Get` response.
    fn class_objects(&self, data: GetData) -> Vec<ChunkObject> {
        data.get
            .into_iter()
            .find(|(class, _)| class == &self.class_name)
            .and_then(|(_, objects)| objects)
            .unwrap_or_default()
    }

    async fn batch_delete(&self, filter: WhereFilter) -> Result<usize, VectorStoreError> {
        let body = BatchDeleteRequest {
            match_: BatchDeleteMatch {
                class: &self.class_name,
                where_: filter,
            },
            output: "minimal",
        };
        let request = self
            .client
            .delete(self.url("/v1/batch/objects"))
            .json(&body);
        let response: BatchDeleteResponse = decode(self.send(request).await?).await?;
        Ok(response.results.successful)
    }
}

/// `^[A-Z][A-Za-z0-9_]*$`: the class name goes into URL paths and
/// GraphQL queries unescaped.
pub fn is_valid_class_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

async fn status_error(response: Response) -> VectorStoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    VectorStoreError::HttpStatus { status, body }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, VectorStoreError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| VectorStoreError::Decode(e.to_string()))
}

/// A GraphQL string literal (JSON string escaping is valid GraphQL).
fn graphql_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

const RETURNED_FIELDS: &str = "chunk fileName documentId chunkIndex";

fn equality_query(class: &str, field: RecordField, value: &str, limit: usize) -> String {
    format!(
        "{{ Get {{ {class}(where: {{path: [\"{path}\"], operator: Equal, valueText: {value}}}, limit: {limit}) {{ {fields} _additional {{ id }} }} }} }}",
        class = class,
        path = field.property_name(),
        value = graphql_string(value),
        limit = limit,
        fields = RETURNED_FIELDS,
    )
}

fn near_vector_query(class: &str, vector: &[f32], limit: usize) -> String {
    let vector = serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{{ Get {{ {class}(nearVector: {{vector: {vector}}}, limit: {limit}) {{ {fields} _additional {{ id distance }} }} }} }}",
        class = class,
        vector = vector,
        limit = limit,
        fields = RETURNED_FIELDS,
    )
}

#[async_trait]
impl VectorStore for WeaviateStore {
    async fn ensure_schema(&self) -> Result<SchemaStatus, VectorStoreError> {
        let existing = self
            .client
            .get(self.url(&format!("/v1/schema/{}", self.class_name)))
            .send()
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        match existing.status() {
            s if s.is_success() => return Ok(SchemaStatus::AlreadyExists),
            StatusCode::NOT_FOUND => {}
            _ => return Err(status_error(existing).await),
        }

        let request = self
            .client
            .post(self.url("/v1/schema"))
            .json(&ClassDefinition::chunks(&self.class_name));
        match self.send(request).await {
            Ok(_) => {
                info!(class = %self.class_name, "schema created");
                Ok(SchemaStatus::Created)
            }
            Err(VectorStoreError::HttpStatus { status: 422, body })
                if body.contains("already exists") =>
            {
                Ok(SchemaStatus::AlreadyExists)
            }
            Err(VectorStoreError::HttpStatus { status, body }) => Err(VectorStoreError::Schema(
                format!("class creation returned {}: {}", status, body),
            )),
            Err(e) => Err(e),
        }
    }

    async fn upsert(&self, record: &VectorRecord) -> Result<(), VectorStoreError> {
        let body = BatchRequest {
            objects: vec![BatchObject {
                class: &self.class_name,
                id: record.id,
                properties: &record.properties,
                vector: &record.vector,
            }],
        };
        let request = self
            .client
            .post(self.url("/v1/batch/objects"))
            .json(&body);
        let results: Vec<BatchObjectResult> = decode(self.send(request).await?).await?;

        let message = results
            .into_iter()
            .filter_map(|r| r.result)
            .filter_map(|r| r.errors)
            .flat_map(|e| e.error)
            .map(|e| e.message)
            .next();
        match message {
            Some(message) => Err(VectorStoreError::Rejected {
                id: record.id,
                message,
            }),
            None => {
                debug!(id = %record.id, "object written");
                Ok(())
            }
        }
    }

    async fn exists(&self, id: Uuid) -> Result<bool, VectorStoreError> {
        let request = self
            .client
            .head(self.url(&format!("/v1/objects/{}/{}", self.class_name, id)));
        match self.send(request).await {
            Ok(_) => Ok(true),
            Err(VectorStoreError::HttpStatus { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), VectorStoreError> {
        let request = self
            .client
            .delete(self.url(&format!("/v1/objects/{}/{}", self.class_name, id)));
        match self.send(request).await {
            Ok(_) | Err(VectorStoreError::HttpStatus { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn query_by_equality(
        &self,
        field: RecordField,
        value: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, VectorStoreError> {
        let data: GetData = self
            .graphql(equality_query(&self.class_name, field, value, limit))
            .await?;
        let mut records: Vec<StoredRecord> = self
            .class_objects(data)
            .into_iter()
            .map(ChunkObject::into_record)
            .collect();
        records.sort_by_key(|r| r.chunk_index);
        Ok(records)
    }

    async fn search_near(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let data: GetData = self
            .graphql(near_vector_query(&self.class_name, vector, limit))
            .await?;
        Ok(self
            .class_objects(data)
            .into_iter()
            .map(|object| {
                let distance = object.additional.distance.unwrap_or(f32::MAX);
                SearchHit {
                    record: object.into_record(),
                    distance,
                }
            })
            .collect())
    }

    async fn delete_where(
        &self,
        field: RecordField,
        value: &str,
    ) -> Result<usize, VectorStoreError> {
        self.batch_delete(WhereFilter {
            path: vec![field.property_name()],
            operator: "Equal",
            value_text: value.to_string(),
        })
        .await
    }

    async fn delete_all(&self) -> Result<usize, VectorStoreError> {
        self.batch_delete(WhereFilter {
            path: vec![RecordField::DocumentId.property_name()],
            operator: "Like",
            value_text: "*".to_string(),
        })
        .await
    }
}

// ============ Wire types ============

#[derive(Serialize)]
struct ClassDefinition<'a> {
    class: &'a str,
    vectorizer: &'static str,
    properties: Vec<PropertyDefinition>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PropertyDefinition {
    name: &'static str,
    data_type: [&'static str; 1],
}

impl<'a> ClassDefinition<'a> {
    fn chunks(class: &'a str) -> Self {
        let property = |name, data_type| PropertyDefinition {
            name,
            data_type: [data_type],
        };
        Self {
            class,
            vectorizer: "none",
            properties: vec![
                property("chunk", "text"),
                property("fileName", "text"),
                property("documentId", "text"),
                property("chunkIndex", "int"),
                property("createdAt", "date"),
            ],
        }
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    objects: Vec<BatchObject<'a>>,
}

#[derive(Serialize)]
struct BatchObject<'a> {
    class: &'a str,
    id: Uuid,
    properties: &'a RecordProperties,
    vector: &'a [f32],
}

#[derive(Deserialize)]
struct BatchObjectResult {
    #[serde(default)]
    result: Option<BatchResult>,
}

#[derive(Deserialize)]
struct BatchResult {
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Deserialize)]
struct BatchErrors {
    #[serde(default)]
    error: Vec<BatchErrorMessage>,
}

#[derive(Deserialize)]
struct BatchErrorMessage {
    message: String,
}

#[derive(Serialize)]
struct WhereFilter {
    path: Vec<&'static str>,
    operator: &'static str,
    #[serde(rename = "valueText")]
    value_text: String,
}

#[derive(Serialize)]
struct BatchDeleteRequest<'a> {
    #[serde(rename = "match")]
    match_: BatchDeleteMatch<'a>,
    output: &'static str,
}

#[derive(Serialize)]
struct BatchDeleteMatch<'a> {
    class: &'a str,
    #[serde(rename = "where")]
    where_: WhereFilter,
}

#[derive(Deserialize)]
struct BatchDeleteResponse {
    results: BatchDeleteResults,
}

#[derive(Deserialize)]
struct BatchDeleteResults {
    #[serde(default)]
    successful: usize,
}

#[derive(Serialize)]
struct GraphQlRequest {
    query: String,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct GetData {
    #[serde(rename = "Get")]
    get: HashMap<String, Option<Vec<ChunkObject>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkObject {
    chunk: Option<String>,
    file_name: Option<String>,
    document_id: Option<String>,
    chunk_index: Option<i64>,
    #[serde(rename = "_additional")]
    additional: Additional,
}

#[derive(Deserialize)]
struct Additional {
    id: Uuid,
    #[serde(default)]
    distance: Option<f32>,
}

impl ChunkObject {
    fn into_record(self) -> StoredRecord {
        StoredRecord {
            id: self.additional.id,
            chunk: self.chunk.unwrap_or_default(),
            file_name: self.file_name.unwrap_or_default(),
            document_id: self.document_id.unwrap_or_default(),
            chunk_index: self.chunk_index,
        }
    }
}
