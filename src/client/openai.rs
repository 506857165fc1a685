//! Adapter for OpenAI-compatible chat completion endpoints.
//!
//! Epistemic foundation:
//! - K_i: OpenAI API schema is the de facto standard
//! - K_i: Aggregators (OpenRouter) and on-prem (vLLM, Ollama) all support it
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Response will be valid JSON (might fail)

use crate::client::provider::{ProviderAdapter, classify_error, transport_error};
use crate::models::{BiasProbeError, ProviderError, ProviderSpec, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Adapter for any OpenAI-compatible endpoint.
///
/// Supports:
/// - OpenAI
/// - OpenRouter, Together AI, Groq (aggregators)
/// - vLLM, Ollama, llama.cpp (on-prem)
pub struct OpenAiAdapter {
    client: reqwest::Client,
    spec: ProviderSpec,
    /// API key (empty for local endpoints without auth)
    api_key: String,
    /// Base URL for the API
    base_url: String,
    /// Request timeout
    timeout: Duration,
}

impl OpenAiAdapter {
    /// Create a new adapter for one model.
    pub fn new(
        spec: ProviderSpec,
        api_key: String,
        base_url: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BiasProbeError::Network)?;

        Ok(Self {
            client,
            spec,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Build headers for a request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        // Add Authorization header if API key is present
        if !self.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|e| {
                BiasProbeError::InvalidInput(format!("API key is not a valid header: {e}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    /// Complete a single-turn chat request.
    ///
    /// B_i(API available) → Result
    /// B_i(valid response) → Result
    async fn complete(&self, prompt_text: &str) -> Result<String> {
        let start = Instant::now();

        let request = ChatCompletionRequest {
            model: &self.spec.model_id,
            messages: vec![Message::user(prompt_text)],
            max_tokens: self.spec.max_tokens,
            temperature: self.spec.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error("openai", &self.spec.model_id, status, &headers, &body).into());
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            BiasProbeError::Provider(ProviderError::InvalidResponse(format!(
                "Failed to parse response: {e}"
            )))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                BiasProbeError::Provider(ProviderError::InvalidResponse(
                    "No choices in response".to_string(),
                ))
            })?
            .message
            .content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::EmptyCompletion(self.spec.name.clone()))?;

        if let Some(usage) = body.usage {
            debug!(
                model = %self.spec.name,
                served_by = body.model.as_deref().unwrap_or(&self.spec.model_id),
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                duration_ms = start.elapsed().as_millis() as u64,
                "OpenAI completion"
            );
        }

        Ok(content)
    }
}
