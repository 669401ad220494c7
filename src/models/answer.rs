//! Result of a single question.

use serde::{Deserialize, Serialize};

use super::search::ScoredChunk;
use crate::error::GenerationError;

/// What the model is told to say when the context does not cover the question.
pub const FALLBACK_ANSWER: &str = "I don't know based on the documents.";

/// Why an answer is degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AnswerFailure {
    EmptyQuestion,
    /// Embedding the question or searching the index failed.
    Retrieval(String),
    ServiceUnavailable(String),
    MalformedResponse(String),
    Timeout,
    Rejected(String),
}

impl AnswerFailure {
    pub fn message(&self) -> String {
        match self {
            AnswerFailure::EmptyQuestion => "question is empty".to_string(),
            AnswerFailure::Retrieval(msg) => format!("retrieval failed: {msg}"),
            AnswerFailure::ServiceUnavailable(msg) => {
                format!("generation service unavailable: {msg}")
            }
            AnswerFailure::MalformedResponse(msg) => {
                format!("malformed generation response: {msg}")
            }
            AnswerFailure::Timeout => "generation timed out".to_string(),
            AnswerFailure::Rejected(msg) => format!("generation request rejected: {msg}"),
        }
    }
}

impl From<&GenerationError> for AnswerFailure {
    fn from(error: &GenerationError) -> Self {
        match error {
            GenerationError::Unavailable(msg) => AnswerFailure::ServiceUnavailable(msg.clone()),
            GenerationError::Rejected(msg) => AnswerFailure::Rejected(msg.clone()),
            GenerationError::MissingApiKey => AnswerFailure::Rejected(error.to_string()),
            GenerationError::MalformedResponse(msg) => {
                AnswerFailure::MalformedResponse(msg.clone())
            }
            GenerationError::Timeout => AnswerFailure::Timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failure", rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    Degraded(AnswerFailure),
}

/// Answer text plus the chunks it was grounded on, most similar first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
    pub status: AnswerStatus,
}

impl AnswerResult {
    pub fn answered(answer: String, sources: Vec<ScoredChunk>) -> Self {
        Self {
            answer,
            sources,
            status: AnswerStatus::Answered,
        }
    }

    /// User-visible error answer with no sources.
    pub fn degraded(failure: AnswerFailure) -> Self {
        Self {
            answer: format!("Error: {}", failure.message()),
            sources: Vec::new(),
            status: AnswerStatus::Degraded(failure),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, AnswerStatus::Degraded(_))
    }
}
