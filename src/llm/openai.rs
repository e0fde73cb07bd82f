//! OpenAI 호환 클라이언트 - embeddings + chat completions
//!
//! 엔드포인트 URL과 API 키만으로 OpenAI, Ollama, llama.cpp 서버 등에 연결합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let client = OpenAiClient::from_config(&config)?;
//! let vector = client.embed("Hello, world!", None).await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

use super::{CompletionProvider, EmbeddingProvider};

/// HTTP 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

/// OpenAI 에러 응답
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

// ============================================================================
// OpenAiClient
// ============================================================================

/// OpenAI 호환 LLM 클라이언트
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    endpoint: String,
    embedding_endpoint: String,
    api_key: Option<String>,
    default_model: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `endpoint` - chat completions URL
    /// * `embedding_endpoint` - embeddings URL
    /// * `api_key` - Bearer 키 (None이면 헤더 생략)
    pub fn new(
        endpoint: impl Into<String>,
        embedding_endpoint: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            embedding_endpoint: embedding_endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            default_model: default_model.into(),
            embedding_model: embedding_model.into(),
            client,
        })
    }

    /// 설정에서 생성
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.llm_endpoint.clone(),
            config.embedding_endpoint.clone(),
            config.api_key.clone(),
            config.default_model.clone(),
            config.embedding_model.clone(),
        )
    }

    fn resolve_model<'a>(requested: Option<&'a str>, default: &'a str) -> &'a str {
        requested.filter(|m| !m.trim().is_empty()).unwrap_or(default)
    }

    /// JSON POST 후 성공 응답 본문 반환
    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<String> {
        let mut request = self.client.post(url).json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&text) {
                anyhow::bail!(
                    "LLM server returned status {} ({}): {}",
                    status,
                    error.error.kind.unwrap_or_default(),
                    error.error.message
                );
            }
            anyhow::bail!("LLM server returned status: {}", status);
        }

        Ok(text)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>> {
        if self.embedding_endpoint.is_empty() {
            anyhow::bail!("LLM_EMBEDDING_ENDPOINT is not configured");
        }

        let model = Self::resolve_model(model, &self.embedding_model);
        let body = EmbeddingRequest { model, input: text };

        tracing::debug!("Embedding {} chars with model {}", text.len(), model);
        let response = self.post_json(&self.embedding_endpoint, &body).await?;
        parse_embedding(&response)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
        system: Option<&str>,
    ) -> Result<String> {
        if self.endpoint.is_empty() {
            anyhow::bail!("LLM_ENDPOINT is not configured");
        }

        let model = Self::resolve_model(model, &self.default_model);
        let body = ChatRequest {
            model,
            messages: build_messages(prompt, system),
            temperature: 0.0,
        };

        tracing::debug!("Sending {} char prompt to model {}", prompt.len(), model);
        let response = self.post_json(&self.endpoint, &body).await?;
        parse_completion(&response)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn build_messages<'a>(prompt: &'a str, system: Option<&'a str>) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: prompt,
    });
    messages
}

fn parse_embedding(body: &str) -> Result<Vec<f32>> {
    let response: EmbeddingResponse =
        serde_json::from_str(body).context("Failed to parse embedding response")?;

    let embedding = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| anyhow::anyhow!("no response from LLM server"))?;

    if embedding.is_empty() {
        anyhow::bail!("LLM server returned an empty embedding");
    }
    Ok(embedding)
}

fn parse_completion(body: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(body).context("Failed to parse completion response")?;

    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| anyhow::anyhow!("no response from LLM server"))
}

// ============================================================================
// Tests
// ============================================================================
