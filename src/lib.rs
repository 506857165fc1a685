//! biasprobe - Repeated-trial bias experiments across LLM providers.
//!
//! ## Architecture
//!
//! A run sends every prompt in a fixed prompt set to every registered model,
//! a configurable number of times, one call at a time:
//! - **Prompt Designer**: Builds the hypothesis-driven prompt variations
//! - **Provider Registry**: One adapter per configured model (OpenAI, Anthropic, Gemini)
//! - **Experiment Engine**: Enumerates the execution matrix, paces calls, records outcomes
//! - **Persistence**: Per-record journal during the run, JSON array log at the end
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Log length is always prompts × models × trials
//! - B_i (Beliefs): Provider calls may fail → folded into error records
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Provider rate limits → fixed pacing floor, optional retry

pub mod client;
pub mod engine;
pub mod models;
pub mod persist;
pub mod prompts;

// Re-exports for convenience
pub use client::{PacingController, ProviderAdapter, ProviderRegistry};
pub use engine::{EngineOptions, ExecutionMatrix, ExperimentEngine, ExperimentLog, WorkItem};
pub use models::{
    BiasProbeError, Config, ConfigError, PromptSet, ProviderError, ProviderKind, ProviderSpec,
    RecordKey, ResponseRecord, Result, RunStats,
};
pub use persist::{Journal, read_log, write_log};
pub use prompts::{PlayerStats, PromptDesigner};
