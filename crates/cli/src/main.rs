//! kbqa CLI
//!
//! Main entry point for the kbqa command-line tool.
//! Answers questions from tiered local knowledge bases, falling back to web
//! search.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, LearnCommand, StatsCommand};
use kbqa_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// kbqa - answer questions from tiered knowledge bases
#[derive(Parser, Debug)]
#[command(name = "kbqa")]
#[command(about = "Answer questions from tiered knowledge bases with web fallback", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "KBQA_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "KBQA_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory of the tier indexes
    #[arg(long, global = true, env = "PERSISTENT_STORAGE_PATH")]
    storage: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, together, openai)
    #[arg(short, long, global = true, env = "KBQA_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "KBQA_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Ask questions interactively
    Chat(ChatCommand),

    /// Learn sources into a knowledge tier
    Learn(LearnCommand),

    /// Show knowledge tier statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Workspace and config file decide which YAML is read
    let config = AppConfig::load_from(cli.workspace, cli.config)?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.storage,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("kbqa starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Storage: {:?}", config.storage_dir);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_kbqa_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Learn(_) => "learn",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Learn(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
