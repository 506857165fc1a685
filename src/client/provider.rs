//! Provider adapter contract.
//!
//! Epistemic foundation:
//! - K_i: Every provider reduces to `prompt text -> completion text`
//! - B_i: The raw call may fail for any reason → Result
//! - K_i: `invoke` never fails; failures become records

use crate::models::{ProviderError, ProviderSpec, ResponseRecord, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;

/// One LLM provider behind a uniform call contract.
///
/// Implementations own the provider's request shape and the extraction of
/// text from its native response. They must not retry internally.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Model this adapter queries.
    fn spec(&self) -> &ProviderSpec;

    /// Stable display name written to records.
    fn name(&self) -> &str {
        &self.spec().name
    }

    /// Send one prompt and return the completion text.
    async fn complete(&self, prompt_text: &str) -> Result<String>;

    /// Execute one work item, folding any failure into the returned record.
    async fn invoke(&self, prompt_id: &str, prompt_text: &str, trial_index: u32) -> ResponseRecord {
        let result = self.complete(prompt_text).await;
        ResponseRecord::from_result(prompt_id, self.name(), prompt_text, trial_index, result)
    }
}

/// Error body shape shared by OpenAI, Anthropic and Gemini.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a non-success HTTP response onto a provider error.
pub(crate) fn classify_error(
    provider: &str,
    model_id: &str,
    status: u16,
    headers: &HeaderMap,
    body: &str,
) -> ProviderError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });

    match status {
        401 | 403 => ProviderError::AuthenticationFailed {
            provider: provider.to_string(),
            message,
        },
        404 => ProviderError::ModelNotFound(model_id.to_string()),
        429 => ProviderError::RateLimited {
            provider: provider.to_string(),
            message,
            retry_after_secs: headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok()),
        },
        _ => ProviderError::ApiError { status, message },
    }
}

/// Map a transport error, distinguishing timeouts.
pub(crate) fn transport_error(
    err: reqwest::Error,
    timeout: std::time::Duration,
) -> crate::models::BiasProbeError {
    if err.is_timeout() {
        crate::models::BiasProbeError::Timeout(timeout)
    } else {
        crate::models::BiasProbeError::Network(err)
    }
}
