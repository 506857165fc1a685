//! Adapter for the Google Gemini `generateContent` API.
//!
//! B_i: A candidate may be missing when the prompt is blocked by safety
//! filters; that is reported as an invalid response, not an empty string.

use crate::client::provider::{ProviderAdapter, classify_error, transport_error};
use crate::models::{BiasProbeError, ProviderError, ProviderSpec, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

/// Google Gemini adapter.
pub struct GeminiAdapter {
    client: reqwest::Client,
    spec: ProviderSpec,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiAdapter {
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

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url, self.spec.model_id
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| {
                BiasProbeError::InvalidInput(format!("invalid Gemini API key header: {e}"))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    async fn complete(&self, prompt_text: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt_text }],
            }],
            generation_config: GenerationConfig {
                temperature: self.spec.temperature,
                max_output_tokens: self.spec.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
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
                classify_error("gemini", &self.spec.model_id, status, &headers, &body).into(),
            );
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            BiasProbeError::Provider(ProviderError::InvalidResponse(format!(
                "Failed to parse response: {e}"
            )))
        })?;

        if let Some(usage) = &body.usage_metadata {
            debug!(
                model = %self.spec.name,
                input_tokens = usage.prompt_token_count.unwrap_or(0),
                output_tokens = usage.candidates_token_count.unwrap_or(0),
                "Gemini completion"
            );
        }

        let Some(candidate) = body.candidates.into_iter().next() else {
            let reason = body
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(ProviderError::InvalidResponse(format!("prompt blocked: {reason}")).into());
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            return Err(ProviderError::InvalidResponse(format!(
                "candidate has no text (finish reason: {reason})"
            ))
            .into());
        }
        Ok(text)
    }
}
