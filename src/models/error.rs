//! Error types for biasprobe.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad config, bad prompt file)
//! - I^B materialized: Provider failures (network, timeout, quota)
//! - K_i violated: Internal invariant violations (bugs)

use thiserror::Error;

/// Top-level error type for biasprobe.
#[derive(Debug, Error)]
pub enum BiasProbeError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("Provider API error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Provider API specific errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed for {provider}: {message}")]
    AuthenticationFailed { provider: String, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        message: String,
        retry_after_secs: Option<f64>,
    },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty completion from {0}")]
    EmptyCompletion(String),
}

impl BiasProbeError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Network(_)
                | Self::Provider(ProviderError::RateLimited { .. })
                | Self::Provider(ProviderError::ApiError { status: 500..=599, .. })
        )
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::Provider(ProviderError::RateLimited {
                retry_after_secs, ..
            }) => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for biasprobe.
pub type Result<T> = std::result::Result<T, BiasProbeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retryable_classification() {
        assert!(BiasProbeError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            BiasProbeError::Provider(ProviderError::ApiError {
                status: 503,
                message: "overloaded".to_string(),
            })
            .is_retryable()
        );
        assert!(
            !BiasProbeError::Provider(ProviderError::AuthenticationFailed {
                provider: "openai".to_string(),
                message: "bad key".to_string(),
            })
            .is_retryable()
        );
        assert!(
            !BiasProbeError::Provider(ProviderError::ApiError {
                status: 400,
                message: "bad request".to_string(),
            })
            .is_retryable()
        );
    }

    #[test]
    fn test_retry_after_hint() {
        let err = BiasProbeError::Provider(ProviderError::RateLimited {
            provider: "anthropic".to_string(),
            message: "slow down".to_string(),
            retry_after_secs: Some(4.0),
        });
        assert_eq!(err.retry_after(), Some(4.0));
        assert_eq!(BiasProbeError::Internal("x".to_string()).retry_after(), None);
    }
}
