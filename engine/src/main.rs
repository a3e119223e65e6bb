// Parley Telegram assistant
// Main entry point for the parley binary

use clap::Parser;
use parley_engine::cli::{Cli, Command, HistoryAction};
use parley_engine::config::Config;
use parley_engine::handlers::{
    handle_history_clear, handle_history_show, handle_history_stats, handle_serve, OutputFormat,
};
use parley_engine::telemetry::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the config file; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_logging(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Parley v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Serve { bind } => handle_serve(&config, bind).await,

        Command::History { action } => match action {
            HistoryAction::Show { user } => handle_history_show(&user, &config, format).await,
            HistoryAction::Clear { user } => handle_history_clear(&user, &config, format).await,
            HistoryAction::Stats { user } => handle_history_stats(&user, &config, format).await,
        },
    }
}
