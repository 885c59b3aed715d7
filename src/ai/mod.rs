//! Client for the external AI API (transcription, chat, embeddings).
//!
//! Talks to an OpenAI-compatible surface; base URL, key, and model names all
//! come from configuration so a local inference server works the same way.
//! Every failure is mapped onto the closed [`AiError`] set — retry policy
//! elsewhere dispatches on these kinds, never on transport error shapes.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::AiConfig;

/// Failure classes for external AI calls.
#[derive(Debug, Clone, Error)]
pub enum AiError {
    #[error("rate limited by AI API")]
    RateLimited,

    #[error("AI API server error (status {status})")]
    Server { status: u16 },

    #[error("AI API authentication failed")]
    Auth,

    #[error("invalid AI API request: {0}")]
    InvalidRequest(String),

    #[error("AI API network error: {0}")]
    Network(String),

    /// A response that parsed but cannot be trusted: missing choices, an
    /// embedding count that does not match the input, an empty vector.
    #[error("malformed AI API response: {0}")]
    MalformedResponse(String),
}

impl AiError {
    /// Rate limits, server errors, and transport failures are transient;
    /// everything else fails immediately without consuming retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AiError::RateLimited | AiError::Server { .. } | AiError::Network(_)
        )
    }
}

/// Embedding seam consumed by the vectorization pipeline and vector search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError>;
}

pub struct AiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    transcription_model: String,
}

impl AiClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            transcription_model: config.transcription_model.clone(),
        }
    }

    /// Generate a chat completion; returns the assistant message text.
    pub async fn chat(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.3,
        };

        log::info!(
            "Chat request: model={}, prompt_len={}",
            self.chat_model,
            prompt.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AiError::MalformedResponse("chat response had no choices".to_string()))
    }

    /// Transcribe one audio payload. Callers are responsible for keeping the
    /// payload under the API's size ceiling; oversized tracks are segmented
    /// before they reach this call.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, AiError> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let file_part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("audio/mpeg")
            .map_err(|e| AiError::InvalidRequest(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.transcription_model.clone())
            .text("response_format", "json");

        log::info!("Transcription request: model={}", self.transcription_model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        Ok(result.text)
    }

    /// Embed a batch of texts in one API call.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        validate_embeddings(result, texts.len())
    }
}

#[async_trait]
impl Embedder for AiClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        self.embed(texts).await
    }
}

/// Map an HTTP status onto the error taxonomy, or pass the response through.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn classify_status(status: StatusCode, body: &str) -> AiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AiError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AiError::Auth,
        s if s.is_server_error() => AiError::Server { status: s.as_u16() },
        s => {
            let excerpt: String = body.chars().take(200).collect();
            AiError::InvalidRequest(format!("status {}: {}", s.as_u16(), excerpt))
        }
    }
}

/// Order by index and enforce the count/non-empty invariants. A mismatched
/// or empty vector is data corruption waiting to happen, so it fails fast
/// instead of being padded out.
fn validate_embeddings(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, AiError> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(AiError::MalformedResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|item| item.index);
    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        if item.embedding.is_empty() {
            return Err(AiError::MalformedResponse(format!(
                "empty embedding at index {}",
                item.index
            )));
        }
        vectors.push(item.embedding);
    }
    Ok(vectors)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AiError::RateLimited.is_retryable());
        assert!(AiError::Server { status: 503 }.is_retryable());
        assert!(AiError::Network("reset".to_string()).is_retryable());
        assert!(!AiError::Auth.is_retryable());
        assert!(!AiError::InvalidRequest("bad".to_string()).is_retryable());
        assert!(!AiError::MalformedResponse("empty".to_string()).is_retryable());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            AiError::RateLimited
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            AiError::Server { status: 502 }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            AiError::Auth
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "too long"),
            AiError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_validate_embeddings_orders_by_index() {
        let response = EmbeddingResponse {
            data: vec![
                EmbeddingItem {
                    index: 1,
                    embedding: vec![2.0],
                },
                EmbeddingItem {
                    index: 0,
                    embedding: vec![1.0],
                },
            ],
        };
        let vectors = validate_embeddings(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_validate_embeddings_rejects_count_mismatch() {
        let response = EmbeddingResponse {
            data: vec![EmbeddingItem {
                index: 0,
                embedding: vec![1.0],
            }],
        };
        let err = validate_embeddings(response, 2).unwrap_err();
        assert!(matches!(err, AiError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validate_embeddings_rejects_empty_vector() {
        let response = EmbeddingResponse {
            data: vec![EmbeddingItem {
                index: 0,
                embedding: Vec::new(),
            }],
        };
        assert!(validate_embeddings(response, 1).is_err());
    }
}
