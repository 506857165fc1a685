//! Configuration models for biasprobe.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns once, before a run starts; the loaded
//! value is then passed by reference and never mutated.

use crate::models::{ProviderKind, ProviderSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Top-level configuration for biasprobe.
///
/// I^R resolved: All configurable parameters are explicit. An empty file
/// reproduces the reference experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Experiment settings
    #[serde(default)]
    pub experiment: ExperimentConfig,

    /// Model registry (queried in this order)
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,

    /// Per-provider connection settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            experiment: ExperimentConfig::default(),
            models: default_models(),
            providers: ProvidersConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Experiment-wide sampling and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Controls randomness in model responses
    #[serde(default = "default_temperature")]
    pub sampling_temperature: f64,

    /// Upper bound on generated tokens per response
    #[serde(default = "default_token_limit")]
    pub response_token_limit: u32,

    /// Number of times each prompt is re-run against each model
    #[serde(default = "default_trials")]
    pub num_trials_per_prompt: u32,

    /// Minimum pause between consecutive provider calls (seconds)
    #[serde(default = "default_pause")]
    pub request_pause_seconds: f64,

    /// Attempts per work item (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_token_limit() -> u32 {
    1000
}

fn default_trials() -> u32 {
    5
}

fn default_pause() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            sampling_temperature: default_temperature(),
            response_token_limit: default_token_limit(),
            num_trials_per_prompt: default_trials(),
            request_pause_seconds: default_pause(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// One entry of the model registry.
///
/// K_i: `name` is the stable analysis key; `model_id` follows the provider's
/// own naming scheme and may change between SDK versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Display name written to every record
    pub name: String,

    /// Provider family
    pub provider: ProviderKind,

    /// Model ID sent to the provider (defaults to `name`)
    #[serde(default)]
    pub model_id: Option<String>,

    /// Per-model temperature override
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Per-model token limit override
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    fn new(name: &str, provider: ProviderKind, model_id: &str) -> Self {
        Self {
            name: name.to_string(),
            provider,
            model_id: Some(model_id.to_string()),
            temperature: None,
            max_tokens: None,
        }
    }
}

fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new("chatgpt-4", ProviderKind::OpenAi, "gpt-4"),
        ModelConfig::new("gemini-pro", ProviderKind::Gemini, "gemini-pro"),
        ModelConfig::new(
            "claude-3-sonnet",
            ProviderKind::Anthropic,
            "claude-3-sonnet-20240229",
        ),
    ]
}

/// Connection settings keyed by provider family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: Option<ProviderConfig>,

    #[serde(default)]
    pub anthropic: Option<ProviderConfig>,

    #[serde(default)]
    pub gemini: Option<ProviderConfig>,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        match kind {
            ProviderKind::OpenAi => self.openai.as_ref(),
            ProviderKind::Anthropic => self.anthropic.as_ref(),
            ProviderKind::Gemini => self.gemini.as_ref(),
        }
    }
}

/// Connection settings for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (supports ${ENV_VAR} expansion)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderKind {
    /// Environment variable consulted when no key is configured.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Public API base URL.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

fn default_timeout() -> u64 {
    120
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Final JSON log path
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Append every record to a JSONL journal as it is produced
    #[serde(default = "default_true")]
    pub journal: bool,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("data/raw_responses.json")
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            journal: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check the run constraints that must hold before any call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let exp = &self.experiment;

        if self.models.is_empty() {
            return Err(ConfigError::Invalid(
                "model registry is empty: configure at least one [[models]] entry".to_string(),
            ));
        }
        if exp.num_trials_per_prompt == 0 {
            return Err(ConfigError::Invalid(
                "num_trials_per_prompt must be at least 1".to_string(),
            ));
        }
        if exp.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if std::time::Duration::try_from_secs_f64(exp.request_pause_seconds).is_err() {
            return Err(ConfigError::Invalid(format!(
                "request_pause_seconds must be a finite, representable value >= 0, got {}",
                exp.request_pause_seconds
            )));
        }

        let mut seen = BTreeSet::new();
        for model in &self.models {
            if model.name.trim().is_empty() {
                return Err(ConfigError::Invalid("model name must not be empty".to_string()));
            }
            if !seen.insert(model.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate model name '{}'",
                    model.name
                )));
            }
        }

        Ok(())
    }

    /// Resolve the registry into fully specified provider specs.
    pub fn provider_specs(&self) -> Vec<ProviderSpec> {
        self.models
            .iter()
            .map(|m| ProviderSpec {
                name: m.name.clone(),
                provider: m.provider,
                model_id: m.model_id.clone().unwrap_or_else(|| m.name.clone()),
                temperature: m
                    .temperature
                    .unwrap_or(self.experiment.sampling_temperature),
                max_tokens: m
                    .max_tokens
                    .unwrap_or(self.experiment.response_token_limit),
            })
            .collect()
    }

    /// Get all unique provider kinds referenced by the registry.
    pub fn referenced_providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.models.iter().map(|m| m.provider).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Connection settings for a provider (defaults when not configured).
    pub fn provider(&self, kind: ProviderKind) -> ProviderConfig {
        self.providers.get(kind).cloned().unwrap_or_default()
    }

    /// Base URL for a provider.
    pub fn base_url(&self, kind: ProviderKind) -> String {
        self.provider(kind)
            .base_url
            .unwrap_or_else(|| kind.default_base_url().to_string())
    }

    /// Request timeout for a provider.
    pub fn timeout_secs(&self, kind: ProviderKind) -> u64 {
        self.provider(kind).timeout_secs.unwrap_or_else(default_timeout)
    }

    /// Resolve API key from config or environment for a provider.
    ///
    /// B_i(api key available) → Result
    pub fn resolve_api_key(&self, kind: ProviderKind) -> Result<String, ConfigError> {
        let provider = self.provider(kind);

        // First check explicit api_key in config
        if let Some(key) = &provider.api_key {
            return Ok(expand_env_vars(key));
        }

        // Then check environment variable
        let env_var = provider
            .api_key_env
            .unwrap_or_else(|| kind.default_api_key_env().to_string());
        std::env::var(&env_var).map_err(|_| ConfigError::MissingApiKey {
            provider: kind.to_string(),
            env_var,
        })
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return result;
    };

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error, constraint violated
/// - I^B materialized: Missing required values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(
        "Missing API key for provider '{provider}': set {env_var} env var or api_key in config"
    )]
    MissingApiKey { provider: String, env_var: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_matches_reference_experiment() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.experiment.sampling_temperature, 0.7);
        assert_eq!(config.experiment.response_token_limit, 1000);
        assert_eq!(config.experiment.num_trials_per_prompt, 5);
        assert_eq!(config.experiment.request_pause_seconds, 2.0);
        assert_eq!(config.experiment.max_attempts, 1);
        assert_eq!(config.output.path, PathBuf::from("data/raw_responses.json"));

        let names: Vec<&str> = config.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["chatgpt-4", "gemini-pro", "claude-3-sonnet"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_specs_apply_overrides() {
        let config = Config::from_toml(
            r#"
[experiment]
sampling_temperature = 0.2
response_token_limit = 256

[[models]]
name = "local"
provider = "openai"

[[models]]
name = "claude"
provider = "anthropic"
model_id = "claude-3-5-sonnet-latest"
temperature = 1.0
max_tokens = 64
"#,
        )
        .unwrap();

        let specs = config.provider_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].model_id, "local");
        assert_eq!(specs[0].temperature, 0.2);
        assert_eq!(specs[0].max_tokens, 256);
        assert_eq!(specs[1].provider, ProviderKind::Anthropic);
        assert_eq!(specs[1].model_id, "claude-3-5-sonnet-latest");
        assert_eq!(specs[1].temperature, 1.0);
        assert_eq!(specs[1].max_tokens, 64);
        assert_eq!(
            config.referenced_providers(),
            vec![ProviderKind::OpenAi, ProviderKind::Anthropic]
        );
    }

    #[test]
    fn test_validate_rejects_bad_runs() {
        let mut config = Config::default();
        config.models.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.experiment.num_trials_per_prompt = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.experiment.request_pause_seconds = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.experiment.request_pause_seconds = 1e20;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.experiment.request_pause_seconds = 0.0;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.models.push(config.models[0].clone());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_resolve_api_key_prefers_config() {
        let config = Config::from_toml(
            r#"
[providers.gemini]
api_key = "literal-key"

[providers.openai]
api_key_env = "BIASPROBE_TEST_UNSET_VARIABLE"
"#,
        )
        .unwrap();

        assert_eq!(
            config.resolve_api_key(ProviderKind::Gemini).unwrap(),
            "literal-key"
        );
        assert!(matches!(
            config.resolve_api_key(ProviderKind::OpenAi),
            Err(ConfigError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown_placeholders() {
        assert_eq!(
            expand_env_vars("key-${BIASPROBE_TEST_UNSET_VARIABLE}"),
            "key-${BIASPROBE_TEST_UNSET_VARIABLE}"
        );
    }
}
