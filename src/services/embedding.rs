//! Embedding clients for the remote embedding service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingProvider};

/// Turns text into fixed-dimension vectors.
///
/// Documents and queries may be embedded differently by the service, so the
/// two entry points are kept apart.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed chunk texts for storage; one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a question for similarity search.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Model identity recorded in the index.
    fn model_id(&self) -> &str;
}

/// Build the embedder selected by configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::Gemini => Ok(Arc::new(GeminiEmbeddingClient::new(config)?)),
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbeddingClient::new(config)?)),
    }
}

fn build_http_client(timeout_secs: u64) -> Result<Client, EmbeddingError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))
}

fn map_send_error(e: reqwest::Error) -> EmbeddingError {
    if e.is_timeout() {
        EmbeddingError::Timeout
    } else if e.is_connect() {
        EmbeddingError::ConnectionError(e.to_string())
    } else {
        EmbeddingError::RequestError(e)
    }
}

/// Quota and server-side statuses are service errors; other client errors are rejections.
fn status_error(status: StatusCode, body: &str) -> EmbeddingError {
    let message = format!("status {}: {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        EmbeddingError::ServerError(message)
    } else {
        EmbeddingError::Rejected(message)
    }
}

fn ensure_count(expected: usize, embeddings: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            embeddings.len()
        )));
    }
    if embeddings.iter().any(Vec::is_empty) {
        return Err(EmbeddingError::InvalidResponse(
            "empty embedding vector".to_string(),
        ));
    }
    Ok(())
}

// --- Gemini -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

/// Google Generative Language `batchEmbedContents` client.
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .resolve_api_key()
            .ok_or(EmbeddingError::MissingApiKey)?;

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            model: normalize_model_name(&config.model),
            api_key,
        })
    }

    fn build_request<'a>(
        &'a self,
        texts: &'a [String],
        task_type: TaskType,
    ) -> BatchEmbedRequest<'a> {
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.model,
                    content: Content {
                        parts: vec![TextPart { text }],
                    },
                    task_type,
                })
                .collect(),
        }
    }

    async fn embed_with_task(
        &self,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(texts, task_type))
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        let embeddings: Vec<Vec<f32>> = parsed.embeddings.into_iter().map(|e| e.values).collect();
        ensure_count(texts.len(), &embeddings)?;
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for GeminiEmbeddingClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_with_task(texts, TaskType::RetrievalDocument)
            .await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_with_task(&[text.to_string()], TaskType::RetrievalQuery)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Gemini model names carry a `models/` prefix in request paths.
fn normalize_model_name(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

// --- Text-embeddings server ---------------------------------------------------

/// Instruction type for embedding generation.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionType {
    /// For indexing documents
    Document,
    /// For search queries
    Query,
}

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
    instruction_type: InstructionType,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Client for a text-embeddings server exposing `POST /embed`.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Get the base URL of the embedding server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn embed_with_type(
        &self,
        texts: &[String],
        instruction_type: InstructionType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            inputs: texts,
            truncate: Some(true),
            instruction_type,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        ensure_count(texts.len(), &embed_response.0)?;
        Ok(embed_response.0)
    }
}

#[async_trait]
impl Embedder for HttpEmbeddingClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_with_type(texts, InstructionType::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_with_type(&[text.to_string()], InstructionType::Query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
