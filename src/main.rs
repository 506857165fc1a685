//! biasprobe CLI - Repeated-trial bias experiments across LLM providers.

use anyhow::{Context, Result};
use biasprobe::{Config, ExperimentEngine, PromptDesigner, PromptSet};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG: &str = "biasprobe.toml";
const DEFAULT_PROMPTS: &str = "prompts/prompt_templates.json";

#[derive(Parser)]
#[command(name = "biasprobe")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Repeated-trial bias experiments across LLM providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (built-in defaults when omitted and biasprobe.toml is absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every prompt against every configured model
    Run {
        /// Path to prompt templates JSON file
        #[arg(short, long, default_value = DEFAULT_PROMPTS)]
        prompts: PathBuf,

        /// Path to output JSON log (overrides [output].path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Trials per prompt and model (overrides num_trials_per_prompt)
        #[arg(short, long)]
        trials: Option<u32>,

        /// Reuse records from an interrupted run's journal
        #[arg(long)]
        resume: bool,
    },

    /// Generate the prompt variation templates
    Prompts {
        /// Path to output JSON file
        #[arg(short, long, default_value = DEFAULT_PROMPTS)]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).exists() => Path::new(DEFAULT_CONFIG),
        None => {
            info!("No {DEFAULT_CONFIG} found, using built-in defaults");
            return Ok(Config::default());
        }
    };

    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn print_example_config() {
    let example = r#"# biasprobe configuration file

[experiment]
sampling_temperature = 0.7
response_token_limit = 1000
num_trials_per_prompt = 5
# Minimum seconds between consecutive provider calls
request_pause_seconds = 2.0
# Attempts per call; only timeouts, rate limits and 5xx are retried
max_attempts = 1

# Queried in this order. `name` is what appears in the log.
[[models]]
name = "chatgpt-4"
provider = "openai"
model_id = "gpt-4"

[[models]]
name = "gemini-pro"
provider = "gemini"
model_id = "gemini-pro"

[[models]]
name = "claude-3-sonnet"
provider = "anthropic"
model_id = "claude-3-sonnet-20240229"
# temperature = 0.7
# max_tokens = 1000

[providers.openai]
# API key (can also use OPENAI_API_KEY env var)
# api_key = "${OPENAI_API_KEY}"
base_url = "https://api.openai.com/v1"
timeout_secs = 120

[providers.anthropic]
# api_key_env = "CLAUDE_API_KEY"
base_url = "https://api.anthropic.com/v1"

[providers.gemini]
base_url = "https://generativelanguage.googleapis.com/v1beta"

[output]
path = "data/raw_responses.json"
# Per-record journal for `run --resume`
journal = true
"#;
    println!("{example}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Prompts { output } => {
            let prompts = PromptDesigner::new()
                .variations()
                .context("Failed to build prompt variations")?;
            prompts
                .write_to(&output)
                .with_context(|| format!("Failed to write prompts to {output:?}"))?;

            println!("Generated {} prompt templates for 4 hypotheses.", prompts.len());
            println!("Output:      {output:?}");
        }

        Commands::Validate => {
            let config = load_config(cli.config.as_deref())?;
            config.validate().context("Invalid configuration")?;

            for kind in config.referenced_providers() {
                config
                    .resolve_api_key(kind)
                    .with_context(|| format!("Failed to resolve API key for {kind}"))?;
            }

            info!("Configuration is valid");
            for spec in config.provider_specs() {
                info!(
                    "  {} -> {} {} (temperature {}, max_tokens {})",
                    spec.name, spec.provider, spec.model_id, spec.temperature, spec.max_tokens
                );
            }
            info!(
                "  Trials per prompt: {}",
                config.experiment.num_trials_per_prompt
            );
            info!(
                "  Pause between calls: {}s",
                config.experiment.request_pause_seconds
            );
            info!("  Output: {:?}", config.output.path);
        }

        Commands::Run {
            prompts,
            output,
            trials,
            resume,
        } => {
            let mut config = load_config(cli.config.as_deref())?;

            // Override from CLI
            if let Some(output) = output {
                config.output.path = output;
            }
            if let Some(trials) = trials {
                config.experiment.num_trials_per_prompt = trials;
            }
            config.validate().context("Invalid configuration")?;

            let prompt_set = PromptSet::from_file(&prompts)
                .with_context(|| format!("Failed to load prompts from {prompts:?}"))?;

            let mut engine =
                ExperimentEngine::from_config(&config).context("Failed to set up providers")?;
            engine.options_mut().resume = resume;
            if resume && !config.output.journal {
                warn!("Resuming with journaling disabled: new records will not be journaled");
            }

            let log = engine
                .run(&prompt_set, config.experiment.num_trials_per_prompt)
                .await?;
            let stats = log.stats();

            println!("\n=== Experiment Complete ===");
            println!("Prompts:     {}", prompt_set.len());
            println!("Models:      {}", engine.registry().names().join(", "));
            println!("Trials:      {}", config.experiment.num_trials_per_prompt);
            println!("Records:     {}", stats.total_records);
            println!("Succeeded:   {}", stats.succeeded);
            println!("Failed:      {}", stats.failed);
            for (model, count) in &stats.failures_by_model {
                println!("  {model}: {count} failed");
            }
            if stats.resumed > 0 {
                println!("Resumed:     {}", stats.resumed);
            }
            if stats.retries > 0 {
                println!("Retries:     {}", stats.retries);
            }
            println!("Success:     {:.1}%", stats.success_rate * 100.0);
            println!("Pacing wait: {:.1}s", stats.pacing_wait_secs);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {:?}", config.output.path);
        }
    }

    Ok(())
}
