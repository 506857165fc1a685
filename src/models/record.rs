//! Prompt, provider and record types for biasprobe.
//!
//! K_i: These types represent the core data flow through the experiment.

use crate::models::{BiasProbeError, Result};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Ordered mapping from prompt identifier to prompt text.
///
/// K_i: Iteration order is the order of the source file, so repeated runs
/// enumerate prompts identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptSet {
    prompts: IndexMap<String, String>,
}

impl PromptSet {
    /// Build a prompt set from ordered `(id, text)` pairs.
    ///
    /// Later duplicates of an id are rejected rather than silently replacing
    /// the earlier text.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut prompts = IndexMap::new();
        for (id, text) in pairs {
            let id = id.into();
            if prompts.contains_key(&id) {
                return Err(BiasProbeError::InvalidInput(format!(
                    "duplicate prompt id '{id}'"
                )));
            }
            prompts.insert(id, text.into());
        }
        Ok(Self { prompts })
    }

    /// Load a prompt set from a JSON object file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is a non-empty object of strings) → Result
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BiasProbeError::io(format!("reading prompt file {}", path.display()), e))?;

        let set: PromptSet = serde_json::from_str(&content).map_err(|e| {
            BiasProbeError::ParseError(format!("Prompt file {}: {e}", path.display()))
        })?;

        if set.is_empty() {
            return Err(BiasProbeError::InvalidInput(format!(
                "prompt file {} contains no prompts",
                path.display()
            )));
        }

        Ok(set)
    }

    /// Write the prompt set as a pretty JSON object.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BiasProbeError::io("creating prompt directory", e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BiasProbeError::Internal(format!("Serializing prompts: {e}")))?;
        std::fs::write(path, json).map_err(|e| BiasProbeError::io("writing prompt file", e))
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn get(&self, prompt_id: &str) -> Option<&str> {
        self.prompts.get(prompt_id).map(String::as_str)
    }

    /// Iterate `(prompt_id, prompt_text)` in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.prompts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// LLM provider families with a native adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions (and any compatible endpoint)
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
    /// Google Gemini generateContent API
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved model to query during a run.
///
/// K_i: `name` is what lands in every record; `model_id` is what the provider
/// sees. Renaming upstream models never changes the analysis key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Stable display name (record `model` field)
    pub name: String,

    /// Provider family
    pub provider: ProviderKind,

    /// Model identifier sent to the provider
    pub model_id: String,

    /// Sampling temperature
    pub temperature: f64,

    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

/// Result of one provider call as stored in a record.
///
/// Serialized flattened into the record as either `response_text` or
/// `error_message`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "response_text")]
    Success(String),
    #[serde(rename = "error_message")]
    Failure(String),
}

/// Uniform result of executing one work item.
///
/// K_i: Exactly one of `response_text` / `error_message` is present.
/// Records are built once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    prompt_id: String,
    model: String,
    prompt_text: String,
    trial_index: u32,
    /// Call completion time, seconds since the Unix epoch
    timestamp: f64,
    #[serde(flatten)]
    outcome: Outcome,
    /// Whether a failed call is worth another attempt (not persisted)
    #[serde(skip)]
    retryable: bool,
    /// Provider-requested delay before the next attempt (not persisted)
    #[serde(skip)]
    retry_after: Option<Duration>,
}

impl ResponseRecord {
    /// Build a record from a raw provider result, stamping completion time now.
    pub fn from_result(
        prompt_id: &str,
        model: &str,
        prompt_text: &str,
        trial_index: u32,
        result: Result<String>,
    ) -> Self {
        let (outcome, retryable, retry_after) = match result {
            Ok(text) => (Outcome::Success(text), false, None),
            Err(e) => {
                let retry_after = e
                    .retry_after()
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
                let mut message = e.to_string();
                if message.trim().is_empty() {
                    message = "unknown provider error".to_string();
                }
                (Outcome::Failure(message), e.is_retryable(), retry_after)
            }
        };

        Self {
            prompt_id: prompt_id.to_string(),
            model: model.to_string(),
            prompt_text: prompt_text.to_string(),
            trial_index,
            timestamp: epoch_seconds(),
            outcome,
            retryable,
            retry_after,
        }
    }

    pub fn prompt_id(&self) -> &str {
        &self.prompt_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn trial_index(&self) -> u32 {
        self.trial_index
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn response_text(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(text) => Some(text),
            Outcome::Failure(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure(message) => Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Delay the provider asked for before trying again (HTTP `retry-after`).
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Key identifying the work item this record answers.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.prompt_id, &self.model, self.trial_index)
    }
}

/// `(prompt_id, model, trial_index)` identity of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub prompt_id: String,
    pub model: String,
    pub trial_index: u32,
}

impl RecordKey {
    pub fn new(prompt_id: &str, model: &str, trial_index: u32) -> Self {
        Self {
            prompt_id: prompt_id.to_string(),
            model: model.to_string(),
            trial_index,
        }
    }
}

/// Seconds since the Unix epoch with microsecond resolution.
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Statistics for an experiment run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Records in the final log
    pub total_records: usize,

    /// Records with a response
    pub succeeded: usize,

    /// Records with an error
    pub failed: usize,

    /// Records reused from a previous run's journal
    pub resumed: usize,

    /// Extra attempts made by the retry policy
    pub retries: usize,

    /// Failures per model display name
    pub failures_by_model: BTreeMap<String, usize>,

    /// Time spent in pacing sleeps
    pub pacing_wait_secs: f64,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Success rate (0.0 - 1.0)
    pub success_rate: f64,
}

impl RunStats {
    /// Count a record into the totals.
    pub fn record(&mut self, record: &ResponseRecord) {
        self.total_records += 1;
        if record.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            *self
                .failures_by_model
                .entry(record.model().to_string())
                .or_default() += 1;
        }
    }

    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.total_records > 0 {
            self.success_rate = self.succeeded as f64 / self.total_records as f64;
        }
    }
}
