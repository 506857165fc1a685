//! Execution matrix: prompts × providers × trials.
//!
//! K_i: Order is prompt (outer), provider (middle), trial (inner), so two runs
//! over the same inputs enumerate work items identically.

use crate::models::{BiasProbeError, PromptSet, Result};

/// One scheduled (prompt, provider, trial) combination.
#[derive(Debug)]
pub struct WorkItem<'a, P> {
    pub prompt_id: &'a str,
    pub prompt_text: &'a str,
    pub provider: &'a P,
    pub trial_index: u32,
}

impl<P> Clone for WorkItem<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for WorkItem<'_, P> {}

/// Lazy, restartable sequence of work items.
///
/// Nothing is materialized; `iter()` can be called any number of times and
/// always yields the same sequence.
#[derive(Debug)]
pub struct ExecutionMatrix<'a, P> {
    prompts: &'a PromptSet,
    providers: &'a [P],
    repetitions: u32,
}

impl<'a, P> ExecutionMatrix<'a, P> {
    /// Validate inputs and build the matrix.
    pub fn build(prompts: &'a PromptSet, providers: &'a [P], repetitions: u32) -> Result<Self> {
        if prompts.is_empty() {
            return Err(BiasProbeError::InvalidInput("prompt set is empty".to_string()));
        }
        if providers.is_empty() {
            return Err(BiasProbeError::InvalidInput(
                "provider registry is empty".to_string(),
            ));
        }
        if repetitions == 0 {
            return Err(BiasProbeError::InvalidInput(
                "repetitions must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            prompts,
            providers,
            repetitions,
        })
    }

    /// Total number of work items.
    pub fn len(&self) -> usize {
        self.prompts.len() * self.providers.len() * self.repetitions as usize
    }

    /// Never true for a built matrix.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Iterate work items in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = WorkItem<'a, P>> {
        let providers = self.providers;
        let repetitions = self.repetitions;

        self.prompts.iter().flat_map(move |(prompt_id, prompt_text)| {
            providers.iter().flat_map(move |provider| {
                (0..repetitions).map(move |trial_index| WorkItem {
                    prompt_id,
                    prompt_text,
                    provider,
                    trial_index,
                })
            })
        })
    }
}
