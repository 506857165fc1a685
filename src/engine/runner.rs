//! Sequential experiment engine.
//!
//! Flow:
//! PromptSet → ExecutionMatrix → (pace → invoke → mark)* → Journal → JSON log
//!
//! Epistemic foundation:
//! - K_i: Exactly one record per work item, in matrix order
//! - K_i: At most one request in flight; call starts are at least `pause` apart
//! - B_i: Any single call may fail → recorded, never aborts the run
//! - I^B: Process may die mid-run → journal holds everything produced so far

use super::matrix::{ExecutionMatrix, WorkItem};
use crate::client::{PacingController, ProviderAdapter, ProviderRegistry};
use crate::models::{
    BiasProbeError, Config, PromptSet, RecordKey, ResponseRecord, Result, RunStats,
};
use crate::persist::{Journal, dump_fallback, write_log};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Knobs for a single engine run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Minimum spacing between consecutive call starts
    pub pause: Duration,

    /// Attempts per work item; only retryable failures are retried
    pub max_attempts: u32,

    /// Final log path; `None` keeps results in memory only
    pub output_path: Option<PathBuf>,

    /// Write a per-record journal next to the output
    pub journal: bool,

    /// Reuse records found in an existing journal
    pub resume: bool,

    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(2),
            max_attempts: 1,
            output_path: None,
            journal: false,
            resume: false,
            show_progress: false,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        let pause = PacingController::from_secs_f64(config.experiment.request_pause_seconds).pause();
        Self {
            pause,
            max_attempts: config.experiment.max_attempts.max(1),
            output_path: Some(config.output.path.clone()),
            journal: config.output.journal,
            resume: false,
            show_progress: true,
        }
    }
}

/// Ordered records plus run statistics.
#[derive(Debug, Clone)]
pub struct ExperimentLog {
    records: Vec<ResponseRecord>,
    stats: RunStats,
}

impl ExperimentLog {
    pub fn records(&self) -> &[ResponseRecord] {
        &self.records
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ResponseRecord> {
        self.records
    }
}

/// Runs every (prompt, provider, trial) combination one call at a time.
///
/// Pacing state lives for one `run`, so every run starts without a wait.
pub struct ExperimentEngine {
    registry: ProviderRegistry,
    options: EngineOptions,
}

impl ExperimentEngine {
    pub fn new(registry: ProviderRegistry, options: EngineOptions) -> Self {
        Self { registry, options }
    }

    /// Build adapters and options from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = ProviderRegistry::from_config(config)?;
        Ok(Self::new(registry, EngineOptions::from_config(config)))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut EngineOptions {
        &mut self.options
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Run the experiment.
    ///
    /// Produces exactly `prompts × providers × repetitions` records. Provider
    /// failures become error records. The only errors returned are invalid
    /// inputs and a final log that could not be written to its configured
    /// path (in which case the records are dumped to a fallback location).
    pub async fn run(&mut self, prompts: &PromptSet, repetitions: u32) -> Result<ExperimentLog> {
        let start = Instant::now();
        let mut pacing = PacingController::new(self.options.pause);
        let matrix = ExecutionMatrix::build(prompts, self.registry.adapters(), repetitions)?;
        let total = matrix.len();

        info!(
            prompts = prompts.len(),
            models = self.registry.len(),
            repetitions,
            total_calls = total,
            pause_secs = self.options.pause.as_secs_f64(),
            "Starting experiment"
        );

        let journal_path = self.options.output_path.as_deref().map(Journal::path_for);
        let mut resumed = match (&journal_path, self.options.resume) {
            (Some(path), true) => Journal::load(path)?,
            _ => HashMap::new(),
        };
        let mut journal = match &journal_path {
            Some(path) if self.options.journal => Some(Journal::open(path, self.options.resume)?),
            _ => None,
        };

        let pb = progress_bar(total as u64, self.options.show_progress);
        let mut stats = RunStats::default();
        let mut records = Vec::with_capacity(total);

        for item in matrix.iter() {
            let model = item.provider.name();

            let key = RecordKey::new(item.prompt_id, model, item.trial_index);
            match resumed.remove(&key) {
                Some(record) if record.prompt_text() == item.prompt_text => {
                    debug!(prompt_id = item.prompt_id, model, trial = item.trial_index, "Reusing journaled record");
                    stats.resumed += 1;
                    stats.record(&record);
                    records.push(record);
                    pb.inc(1);
                    continue;
                }
                Some(_) => {
                    warn!(
                        prompt_id = item.prompt_id,
                        model,
                        trial = item.trial_index,
                        "Prompt text changed since the journaled record, running again"
                    );
                }
                None => {}
            }

            pb.set_message(format!(
                "{} | {} | repetition {}/{}",
                item.prompt_id,
                model,
                item.trial_index + 1,
                repetitions
            ));

            let (record, retries) =
                execute(&item, &mut pacing, self.options.max_attempts).await;
            stats.retries += retries;

            if let Some(message) = record.error_message() {
                warn!(
                    prompt_id = item.prompt_id,
                    model,
                    trial = item.trial_index,
                    error = %message,
                    "Call failed"
                );
            }

            let mut journal_broken = false;
            if let Some(j) = journal.as_mut() {
                if let Err(e) = j.append(&record) {
                    warn!(error = %e, "Journal write failed, continuing without journal");
                    journal_broken = true;
                }
            }
            if journal_broken {
                journal = None;
            }

            stats.record(&record);
            records.push(record);
            pb.inc(1);
        }

        if !resumed.is_empty() {
            warn!(count = resumed.len(), "Journal held records outside this run's matrix");
        }

        pb.finish_with_message(format!(
            "Done! {} succeeded, {} failed",
            stats.succeeded, stats.failed
        ));

        stats.pacing_wait_secs = pacing.stats().total_wait_secs;
        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();

        if let Some(path) = self.options.output_path.as_deref() {
            persist(path, &records, journal)?;
        }

        info!(
            records = stats.total_records,
            succeeded = stats.succeeded,
            failed = stats.failed,
            resumed = stats.resumed,
            retries = stats.retries,
            success_rate = format!("{:.1}%", stats.success_rate * 100.0),
            runtime = format!("{:.1}s", stats.runtime_secs),
            "Experiment complete"
        );

        Ok(ExperimentLog { records, stats })
    }
}

/// Execute one work item, retrying retryable failures.
///
/// Every attempt goes through the pacing controller, which also honours a
/// provider's `retry-after` hint. Returns the final record and the number of
/// extra attempts made.
async fn execute(
    item: &WorkItem<'_, Arc<dyn ProviderAdapter>>,
    pacing: &mut PacingController,
    max_attempts: u32,
) -> (ResponseRecord, usize) {
    let mut attempt = 1;
    loop {
        pacing.wait().await;
        let record = item
            .provider
            .invoke(item.prompt_id, item.prompt_text, item.trial_index)
            .await;
        pacing.mark();

        if record.is_success() || !record.is_retryable() || attempt >= max_attempts {
            return (record, (attempt - 1) as usize);
        }

        if let Some(delay) = record.retry_after() {
            pacing.hold(delay);
        }
        debug!(
            prompt_id = item.prompt_id,
            model = item.provider.name(),
            attempt,
            max_attempts,
            retry_after_ms = record.retry_after().map(|d| d.as_millis() as u64),
            "Retrying after retryable failure"
        );
        attempt += 1;
    }
}

/// Write the final log; remove the journal once it is durable.
fn persist(path: &Path, records: &[ResponseRecord], journal: Option<Journal>) -> Result<()> {
    match write_log(path, records) {
        Ok(()) => {
            info!(path = %path.display(), records = records.len(), "Log written");
            if let Some(journal) = journal {
                if let Err(e) = journal.remove() {
                    warn!(error = %e, "Failed to remove journal");
                }
            }
            Ok(())
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to write log");
            let saved_to = match dump_fallback(path, records) {
                Some(rescue) => format!("records saved to {}", rescue.display()),
                None => "records dumped to stderr".to_string(),
            };
            Err(match e {
                BiasProbeError::Io { context, source } => BiasProbeError::Io {
                    context: format!("{context} for {}; {saved_to}", path.display()),
                    source,
                },
                other => other,
            })
        }
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb
}
