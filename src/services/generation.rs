//! Text generation client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::models::GenerationConfig;

/// One single-turn generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
}

/// Trait implemented by language-generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, GenerationError>;

    fn model_id(&self) -> &str;
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Google Generative Language `generateContent` client.
pub struct GeminiGenerationClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .resolve_api_key()
            .ok_or(GenerationError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }
}

fn build_body<'a>(request: &'a GenerationRequest<'a>) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: request.system,
            }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part {
                text: request.prompt,
            }],
        }],
        generation_config: GenerationSettings {
            temperature: request.temperature,
        },
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, GenerationError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Rejected(format!("prompt blocked: {reason}")));
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .ok_or_else(|| GenerationError::MalformedResponse("no candidates returned".to_string()))?;

    if text.trim().is_empty() {
        return Err(GenerationError::MalformedResponse(
            "candidate has no text".to_string(),
        ));
    }
    Ok(text.trim().to_string())
}

#[async_trait]
impl Generator for GeminiGenerationClient {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, GenerationError> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("status {}: {}", status, body.trim());
            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    GenerationError::Unavailable(message)
                } else {
                    GenerationError::Rejected(message)
                },
            );
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        extract_text(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
