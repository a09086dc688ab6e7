//! context-memory CLI - Fit conversation histories into a token budget

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use context_memory::{
    config::Config,
    context::{ContextOptimizer, ContextStrategy, Conversation},
    metrics::MetricsTracker,
    tokens::{TiktokenCounter, TokenCounter},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "context-memory")]
#[command(about = "Fit conversation histories into a model's token budget")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a conversation so it fits the token budget
    Optimize {
        /// Conversation JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Model id used for token counting
        #[arg(short, long)]
        model: Option<String>,

        /// Strategy (truncate_oldest, summarize_oldest, keep_recent, sliding_window)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Token budget
        #[arg(short = 't', long)]
        max_tokens: Option<usize>,

        /// Minimum messages to keep
        #[arg(long)]
        min_keep: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show token usage and memory statistics for a conversation
    Stats {
        /// Conversation JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Model id used for token counting
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Count tokens in text or a file
    Count {
        /// Text to count
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// File to count
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Model id used for token counting
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Compare all strategies on a conversation
    Benchmark {
        /// Conversation JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Model id used for token counting
        #[arg(short, long)]
        model: Option<String>,

        /// Token budget
        #[arg(short = 't', long)]
        max_tokens: Option<usize>,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., model, memory.strategy)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Optimize {
            input,
            model,
            strategy,
            max_tokens,
            min_keep,
            output,
        } => {
            run_optimize(input, model, strategy, max_tokens, min_keep, output).await?;
        }
        Commands::Stats { input, model } => {
            run_stats(input, model).await?;
        }
        Commands::Count { text, file, model } => {
            run_count(text, file, model).await?;
        }
        Commands::Benchmark {
            input,
            model,
            max_tokens,
        } => {
            run_benchmark(input, model, max_tokens).await?;
        }
        Commands::Config(cmd) => {
            run_config_command(cmd)?;
        }
    }

    Ok(())
}

async fn load_conversation(path: &Path) -> Result<Conversation> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

async fn run_optimize(
    input: PathBuf,
    model: Option<String>,
    strategy: Option<String>,
    max_tokens: Option<usize>,
    min_keep: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(strategy) = strategy {
        config.memory.strategy = strategy.parse()?;
    }
    if let Some(tokens) = max_tokens {
        config.memory.max_context_tokens = tokens;
    }
    if let Some(keep) = min_keep {
        config.memory.min_messages_to_keep = keep;
    }

    info!(
        "Optimizing {} with {} at {} tokens",
        input.display(),
        config.memory.strategy,
        config.memory.max_context_tokens
    );

    let conversation = load_conversation(&input).await?;
    let optimizer = ContextOptimizer::default();
    let optimized = optimizer.optimize(
        &conversation.system_prompt,
        &conversation.messages,
        &config.model,
        &config.memory,
    );

    let result = serde_json::to_string_pretty(&Conversation {
        system_prompt: optimized.system_prompt,
        messages: optimized.messages,
    })?;

    if let Some(path) = output {
        tokio::fs::write(&path, &result).await?;
        println!("Optimized conversation written to: {}", path.display());
    } else {
        println!("{}", result);
    }

    println!();
    print!("{}", optimized.report);

    Ok(())
}

async fn run_stats(input: PathBuf, model: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let model = model.unwrap_or(config.model);
    let conversation = load_conversation(&input).await?;

    let stats = ContextOptimizer::default().memory_stats(
        &conversation.system_prompt,
        &conversation.messages,
        &model,
        &config.memory,
    );

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_count(
    text: Option<String>,
    file: Option<PathBuf>,
    model: Option<String>,
) -> Result<()> {
    let model = match model {
        Some(model) => model,
        None => Config::load()?.model,
    };

    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => anyhow::bail!("provide --text or --file"),
    };

    let tokens = TiktokenCounter::new().count_tokens(&text, &model);
    println!("{} tokens ({})", tokens, model);
    Ok(())
}

async fn run_benchmark(
    input: PathBuf,
    model: Option<String>,
    max_tokens: Option<usize>,
) -> Result<()> {
    let config = Config::load()?;
    let model = model.unwrap_or(config.model);
    let conversation = load_conversation(&input).await?;

    info!("Running benchmark on {}", input.display());

    let tracker = MetricsTracker::new();
    let optimizer = ContextOptimizer::default().with_sink(Arc::new(tracker.clone()));

    println!("=== Benchmark Results ===\n");
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Strategy", "Messages", "Kept", "Original", "Optimized", "Time (ms)"
    );
    println!("{}", "-".repeat(75));

    for strategy in ContextStrategy::ALL {
        let mut memory = config.memory.clone();
        memory.strategy = strategy;
        if let Some(tokens) = max_tokens {
            memory.max_context_tokens = tokens;
        }

        let optimized = optimizer.optimize(
            &conversation.system_prompt,
            &conversation.messages,
            &model,
            &memory,
        );

        println!(
            "{:<20} {:>10} {:>10} {:>10} {:>10} {:>10.2}",
            strategy.as_str(),
            conversation.messages.len(),
            optimized.messages.len(),
            optimized.report.original_tokens,
            optimized.report.optimized_tokens,
            optimized.report.duration.as_secs_f64() * 1000.0
        );
    }

    println!();
    print!("{}", tracker.summary());
    Ok(())
}

fn run_config_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => config_init(force)?,
        ConfigCommands::Show => config_show()?,
        ConfigCommands::Set { key, value } => config_set(&key, &value)?,
        ConfigCommands::Path => config_path(),
        ConfigCommands::Validate => config_validate()?,
    }
    Ok(())
}

fn config_init(force: bool) -> Result<()> {
    let path = Config::default_path();

    if path.exists() && !force {
        println!("Configuration file already exists at: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    Config::default().save()?;
    println!("Configuration file created at: {}", path.display());
    Ok(())
}

fn config_show() -> Result<()> {
    let config = Config::load()?;
    println!("{}", toml::to_string_pretty(&config)?);

    println!("\n--- Environment Variables ---");
    for name in [
        "CONTEXT_MEMORY_MODEL",
        "CONTEXT_MEMORY_MAX_TOKENS",
        "CONTEXT_MEMORY_STRATEGY",
        "CONTEXT_MEMORY_MIN_MESSAGES",
    ] {
        println!(
            "{}: {}",
            name,
            std::env::var(name).unwrap_or_else(|_| "not set".to_string())
        );
    }

    Ok(())
}

fn config_set(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.set(key, value)?;
    config.validate()?;
    config.save()?;
    println!("Set {} = {}", key, value);
    Ok(())
}

fn config_path() {
    let path = Config::default_path();
    println!("{}", path.display());

    if path.exists() {
        println!("(file exists)");
    } else {
        println!("(file does not exist - run 'config init' to create)");
    }
}

fn config_validate() -> Result<()> {
    let config = Config::load()?;

    match config.validate() {
        Ok(()) => {
            println!("Configuration is valid!");
            println!();
            println!("Model: {}", config.model);
            println!("Budget: {} tokens", config.memory.max_context_tokens);
            println!("Strategy: {}", config.memory.strategy);
            println!(
                "Summaries: {} (threshold {} tokens, target {} tokens)",
                if config.memory.enable_auto_summarization {
                    "automatic"
                } else {
                    "threshold only"
                },
                config.memory.summarize_threshold,
                config.memory.summary_length
            );
        }
        Err(e) => {
            println!("Configuration validation failed:");
            println!("  {}", e);
        }
    }

    Ok(())
}
