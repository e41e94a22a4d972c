//! Text/vision oracle abstraction.
//!
//! The pipeline treats the language-model provider as a capability object: given a prompt
//! (and optionally image bytes), return generated text; given text, return an embedding
//! vector. The concrete Gemini adapter lives in [`gemini`]; tests substitute deterministic
//! fakes through the [`Oracle`] trait.

pub mod gemini;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

pub use gemini::GeminiService;

/// Errors returned while talking to the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid oracle URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Oracle responded with an unexpected status code.
    #[error("Unexpected oracle response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Oracle response carried no usable candidates or vectors.
    #[error("Oracle returned an empty response")]
    EmptyResponse,
}

/// Embedding intent passed to the provider.
///
/// Document and query embeddings may live in asymmetric spaces, so the caller must state
/// which side of the retrieval pair it is producing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingIntent {
    /// Embedding destined for the vector index.
    Document,
    /// Embedding produced for a search query.
    Query,
}

/// Interface implemented by text/vision generation and embedding backends.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generate text for a plain prompt.
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;

    /// Generate text for a prompt accompanied by image or PDF bytes.
    async fn generate_vision(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, OracleError>;

    /// Produce an embedding vector for the supplied text.
    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>, OracleError>;
}

/// Strip Markdown code fences from a model response, returning the inner text.
///
/// Providers routinely wrap JSON answers in ```` ```json ```` blocks even when told not to.
pub fn strip_code_fences(response: &str) -> &str {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
    }
    if let Some(fence) = text.rfind("```") {
        text = &text[..fence];
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::strip_code_fences;

    #[test]
    fn strips_fenced_json_block() {
        let raw = "```json\n{\"docType\": \"Receipt\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"docType\": \"Receipt\"}");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn tolerates_missing_closing_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }
}
