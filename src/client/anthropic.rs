//! Adapter for the Anthropic Messages API (`/v1/messages`).

use crate::client::provider::{ProviderAdapter, classify_error, transport_error};
use crate::models::{BiasProbeError, ProviderError, ProviderSpec, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<MessagesUsage>,
}

/// Content blocks are tagged by `type`; only text blocks carry completion text.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Anthropic Claude adapter.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    spec: ProviderSpec,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl AnthropicAdapter {
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

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| {
                BiasProbeError::InvalidInput(format!("invalid Anthropic API key header: {e}"))
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    async fn complete(&self, prompt_text: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.spec.model_id,
            max_tokens: self.spec.max_tokens,
            temperature: self.spec.temperature,
            messages: vec![MessageParam {
                role: "user",
                content: prompt_text,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(
                classify_error("anthropic", &self.spec.model_id, status, &headers, &body).into(),
            );
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            BiasProbeError::Provider(ProviderError::InvalidResponse(format!(
                "Failed to parse response: {e}"
            )))
        })?;

        let text: String = body
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if let Some(usage) = &body.usage {
            debug!(
                model = %self.spec.name,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = body.stop_reason.as_deref().unwrap_or("unknown"),
                "Anthropic completion"
            );
        }

        if text.is_empty() {
            return Err(ProviderError::EmptyCompletion(self.spec.name.clone()).into());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> AnthropicAdapter {
        AnthropicAdapter::new(
            ProviderSpec {
                name: "claude-3-sonnet".to_string(),
                provider: ProviderKind::Anthropic,
                model_id: "claude-3-sonnet-20240229".to_string(),
                temperature: 0.7,
                max_tokens: 1000,
            },
            "sk-ant-test".to_string(),
            server.uri(),
            5,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-3-sonnet-20240229",
                "max_tokens": 1000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Player B "},
                    {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                    {"type": "text", "text": "needs coaching."}
                ],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 40, "output_tokens": 5}
            })))
            .mount(&server)
            .await;

        let text = adapter(&server).complete("Which player?").await.unwrap();
        assert_eq!(text, "Player B needs coaching.");
    }

    #[tokio::test]
    async fn test_overloaded_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let record = adapter(&server).invoke("H3_primed", "prompt", 4).await;
        assert_eq!(record.error_message(), Some("Provider API error: API error (status 529): Overloaded"));
        assert!(record.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [],
                "stop_reason": "max_tokens"
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).complete("prompt").await.unwrap_err();
        assert!(matches!(
            err,
            BiasProbeError::Provider(ProviderError::EmptyCompletion(_))
        ));
    }
}
