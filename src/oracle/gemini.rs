//! HTTP adapter for a Gemini-style generation and embedding API.

use crate::config::get_config;
use crate::oracle::{EmbeddingIntent, Oracle, OracleError};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

/// Lightweight HTTP client for the Gemini REST surface.
pub struct GeminiService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) generation_model: String,
    pub(crate) embedding_model: String,
}

impl GeminiService {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, OracleError> {
        let config = get_config();
        let client = Client::builder().user_agent("docvault/0.1").build()?;

        let base_url = normalize_base_url(&config.gemini_url).map_err(OracleError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            generation_model = %config.gemini_generation_model,
            embedding_model = %config.gemini_embedding_model,
            "Initialized oracle HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.gemini_api_key.clone(),
            generation_model: config.gemini_generation_model.clone(),
            embedding_model: config.gemini_embedding_model.clone(),
        })
    }

    async fn generate_with_parts(&self, parts: Vec<Value>) -> Result<String, OracleError> {
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "temperature": 0.0,
                "maxOutputTokens": 20000,
            },
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.generation_model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = OracleError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Oracle generation request failed");
            return Err(error);
        }

        let payload: GenerateResponse = response.json().await?;
        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or(OracleError::EmptyResponse)?;

        Ok(super::strip_code_fences(&text).to_string())
    }
}

#[async_trait]
impl Oracle for GeminiService {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        self.generate_with_parts(vec![json!({ "text": prompt })])
            .await
    }

    async fn generate_vision(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, OracleError> {
        let parts = vec![
            json!({ "text": prompt }),
            json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": BASE64.encode(image),
                }
            }),
        ];
        self.generate_with_parts(parts).await
    }

    async fn embed(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>, OracleError> {
        let task_type = match intent {
            EmbeddingIntent::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingIntent::Query => "RETRIEVAL_QUERY",
        };
        let body = json!({
            "content": { "parts": [{ "text": text }] },
            "taskType": task_type,
        });

        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url.trim_end_matches('/'),
            self.embedding_model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = OracleError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, task_type, "Oracle embedding request failed");
            return Err(error);
        }

        let payload: EmbedResponse = response.json().await?;
        if payload.embedding.values.is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(payload.embedding.values)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}
