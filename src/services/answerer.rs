//! Retrieval-augmented answering over an opened index.

use std::sync::Arc;

use crate::models::{AnswerFailure, AnswerResult, FALLBACK_ANSWER, GenerationConfig, ScoredChunk};
use crate::services::generation::{GenerationRequest, Generator};
use crate::services::index::VectorIndexHandle;
use crate::utils::char_len;

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Fixed instruction sent with every question.
pub fn system_prompt() -> String {
    format!(
        "You are a document assistant. Answer ONLY using the context.\n\
         If the answer is not in the context, say: '{FALLBACK_ANSWER}'\n\
         Keep the answer concise and practical."
    )
}

/// `Question: {q}\n\nContext:\n{chunks}`
pub fn build_prompt(question: &str, context: &str) -> String {
    format!("Question: {question}\n\nContext:\n{context}")
}

/// Keep chunks, best first, until the joined context would exceed `max_chars`.
/// A best chunk longer than the whole budget is cut to fit instead of dropped.
fn fit_context(hits: Vec<ScoredChunk>, max_chars: usize) -> (String, Vec<ScoredChunk>) {
    let mut context = String::new();
    let mut used = 0;
    let mut kept = Vec::with_capacity(hits.len());

    for hit in hits {
        let separator = if kept.is_empty() { 0 } else { CONTEXT_SEPARATOR.len() };
        let len = char_len(&hit.chunk.text);
        if kept.is_empty() && len > max_chars && max_chars > 0 {
            tracing::debug!(chunk = %hit.chunk.id, len, "truncating oversized chunk");
            context.extend(hit.chunk.text.chars().take(max_chars));
            used = max_chars;
            kept.push(hit);
            continue;
        }
        if used + separator + len > max_chars {
            tracing::debug!(chunk = %hit.chunk.id, "chunk does not fit in context");
            continue;
        }
        if separator > 0 {
            context.push_str(CONTEXT_SEPARATOR);
        }
        context.push_str(&hit.chunk.text);
        used += separator + len;
        kept.push(hit);
    }

    (context, kept)
}

pub struct Answerer {
    generator: Arc<dyn Generator>,
    system: String,
    temperature: f32,
    max_context_chars: usize,
}

impl Answerer {
    pub fn new(generator: Arc<dyn Generator>, config: &GenerationConfig) -> Self {
        Self {
            generator,
            system: system_prompt(),
            temperature: config.temperature,
            max_context_chars: config.max_context_chars,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Answer `question` from the `k` most similar chunks. Never fails:
    /// problems come back as a degraded result.
    pub async fn answer(
        &self,
        index: &VectorIndexHandle,
        question: &str,
        k: usize,
    ) -> AnswerResult {
        let question = question.trim();
        if question.is_empty() {
            return AnswerResult::degraded(AnswerFailure::EmptyQuestion);
        }

        let hits = match index.similar(question, k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed");
                return AnswerResult::degraded(AnswerFailure::Retrieval(e.to_string()));
            }
        };

        let (context, sources) = fit_context(hits, self.max_context_chars);
        let prompt = build_prompt(question, &context);
        let request = GenerationRequest {
            system: &self.system,
            prompt: &prompt,
            temperature: self.temperature,
        };

        tracing::debug!(
            sources = sources.len(),
            context_chars = char_len(&context),
            model = self.generator.model_id(),
            "generating answer"
        );

        match self.generator.generate(&request).await {
            Ok(answer) => AnswerResult::answered(answer, sources),
            Err(e) => {
                tracing::warn!(error = %e, "generation failed");
                AnswerResult::degraded(AnswerFailure::from(&e))
            }
        }
    }
}
