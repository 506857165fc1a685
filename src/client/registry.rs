//! Provider registry: one adapter per configured model.
//!
//! Epistemic foundation:
//! - K_i: The model registry is fixed for the duration of a run
//! - K_i: Registry order is query order
//! - I^R: User configures which models and credentials to use

use crate::client::{AnthropicAdapter, GeminiAdapter, OpenAiAdapter, ProviderAdapter};
use crate::models::{BiasProbeError, Config, ProviderKind, ProviderSpec, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Ordered set of provider adapters built from configuration.
///
/// # Example
///
/// ```ignore
/// use biasprobe::{Config, ProviderRegistry};
///
/// let config = Config::from_file("biasprobe.toml".as_ref())?;
/// let registry = ProviderRegistry::from_config(&config)?;
///
/// for adapter in registry.adapters() {
///     println!("{} -> {}", adapter.name(), adapter.spec().model_id);
/// }
/// ```
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Build registry from configuration.
    ///
    /// Resolves one API key per referenced provider, then creates one adapter
    /// per `[[models]]` entry in order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if validation fails or an API key is
    /// missing, before any call is made.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut keys: HashMap<ProviderKind, String> = HashMap::new();
        for kind in config.referenced_providers() {
            keys.insert(kind, config.resolve_api_key(kind)?);
        }

        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::with_capacity(config.models.len());
        for spec in config.provider_specs() {
            let kind = spec.provider;
            let api_key = keys.get(&kind).cloned().ok_or_else(|| {
                BiasProbeError::Internal(format!("API key for {kind} was not resolved"))
            })?;
            let base_url = config.base_url(kind);
            let timeout = config.timeout_secs(kind);

            info!(
                model = %spec.name,
                provider = %kind,
                model_id = %spec.model_id,
                "Registered provider"
            );
            adapters.push(build_adapter(spec, api_key, base_url, timeout)?);
        }

        Ok(Self { adapters })
    }

    /// Build registry from ready-made adapters.
    pub fn from_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Result<Self> {
        if adapters.is_empty() {
            return Err(BiasProbeError::InvalidInput(
                "provider registry is empty".to_string(),
            ));
        }
        Ok(Self { adapters })
    }

    /// Adapters in query order.
    pub fn adapters(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.adapters
    }

    /// Get adapter by display name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    /// Get all display names in order.
    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Create the concrete adapter for a provider family.
pub fn build_adapter(
    spec: ProviderSpec,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
) -> Result<Arc<dyn ProviderAdapter>> {
    Ok(match spec.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiAdapter::new(spec, api_key, base_url, timeout_secs)?),
        ProviderKind::Anthropic => {
            Arc::new(AnthropicAdapter::new(spec, api_key, base_url, timeout_secs)?)
        }
        ProviderKind::Gemini => Arc::new(GeminiAdapter::new(spec, api_key, base_url, timeout_secs)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigError;

    #[test]
    fn test_from_config_preserves_registry_order() {
        let config = Config::from_toml(
            r#"
[[models]]
name = "claude"
provider = "anthropic"

[[models]]
name = "gpt"
provider = "openai"
model_id = "gpt-4o"

[[models]]
name = "gemini"
provider = "gemini"

[providers.openai]
api_key = "k1"

[providers.anthropic]
api_key = "k2"

[providers.gemini]
api_key = "k3"
base_url = "http://localhost:9999/v1beta"
"#,
        )
        .unwrap();

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.names(), vec!["claude", "gpt", "gemini"]);
        assert_eq!(registry.get("gpt").unwrap().spec().model_id, "gpt-4o");
        assert_eq!(
            registry.get("gemini").unwrap().spec().provider,
            ProviderKind::Gemini
        );
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let config = Config::from_toml(
            r#"
[[models]]
name = "gpt"
provider = "openai"

[providers.openai]
api_key_env = "BIASPROBE_TEST_UNSET_VARIABLE"
"#,
        )
        .unwrap();

        assert!(matches!(
            ProviderRegistry::from_config(&config),
            Err(BiasProbeError::Config(ConfigError::MissingApiKey { .. }))
        ));
    }

    #[test]
    fn test_empty_adapter_list_rejected() {
        assert!(ProviderRegistry::from_adapters(Vec::new()).is_err());
    }
}
