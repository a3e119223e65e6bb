//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - serve: open the history store and run the webhook server
//! - history show: print a user's turns and any undecodable records
//! - history clear: delete a user's history
//! - history stats: record count and content length against the budget

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;

use crate::bot::{AccessList, MessageHandler, TelegramClient};
use crate::config::{Config, HistoryBackendKind};
use crate::db::Database;
use crate::history::{FileBackend, HistoryStore, RecordBackend};
use crate::llm::OpenAIProvider;
use crate::server::{self, AppState};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Open the history store configured in `[history]`
///
/// The sqlite backend also hands back its [`Database`] so the caller can
/// checkpoint and close it once the store is no longer used.
pub async fn open_store(config: &Config) -> Result<(HistoryStore, Option<Database>)> {
    let (backend, database): (Arc<dyn RecordBackend>, _) = match config.history.backend {
        HistoryBackendKind::Files => {
            let dir = config.history_dir();
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create history directory {}", dir.display()))?;
            (Arc::new(FileBackend::new(dir)), None)
        }
        HistoryBackendKind::Sqlite => {
            let database = Database::new(&config.db_path())
                .await
                .context("Failed to open database")?;
            (Arc::new(database.history_backend()), Some(database))
        }
    };

    Ok((HistoryStore::new(backend, config.history.budget), database))
}

async fn close_database(database: Option<Database>) -> Result<()> {
    match database {
        Some(database) => database.close().await,
        None => Ok(()),
    }
}

/// Run the webhook server until interrupted
pub async fn handle_serve(config: &Config, bind: Option<String>) -> Result<()> {
    let token = config
        .telegram_token()
        .context("No Telegram bot token: set telegram.token or PARLEY_TELEGRAM_TOKEN")?;
    let api_key = config
        .llm_api_key()
        .context("No LLM API key: set llm.api_key or OPENAI_API_KEY")?;

    let (store, database) = open_store(config).await?;
    let store = Arc::new(store);
    tracing::info!(
        backend = store.backend_name(),
        budget = store.budget(),
        "History store ready"
    );

    let llm = Arc::new(OpenAIProvider::new(config.llm.clone(), api_key));
    let telegram = TelegramClient::new(&config.telegram.api_url, token);
    let access = AccessList::new(
        config.telegram.allowed_users.iter().copied(),
        config.telegram.users_file.clone(),
    );

    let handler = MessageHandler::new(store, llm, telegram, access)
        .with_system_prompt(config.llm.system_prompt.clone())
        .with_parse_mode(config.telegram.parse_mode.as_str());

    let state = AppState::new(handler, config.server.auth_token.clone());
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    let served = server::serve(&bind, state).await;
    close_database(database).await?;
    served
}

/// Print a user's history
pub async fn handle_history_show(user: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let (store, database) = open_store(config).await?;
    let report = store
        .read_report(user)
        .await
        .with_context(|| format!("Failed to read history for {}", user))?;
    close_database(database).await?;

    match format {
        OutputFormat::Text => {
            if report.turns.is_empty() {
                println!("No history for {}", user);
            }
            for turn in &report.turns {
                println!("[{}] {}", turn.role, turn.content);
            }
            if !report.skipped.is_empty() {
                println!();
                println!("⚠ {} undecodable record(s) skipped:", report.skipped.len());
                for id in &report.skipped {
                    println!("  {}", id);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "user": user,
                "turns": report.turns,
                "skipped": report.skipped,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Delete a user's history
pub async fn handle_history_clear(user: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let (store, database) = open_store(config).await?;
    let removed = store
        .clear(user)
        .await
        .with_context(|| format!("Failed to clear history for {}", user))?;
    close_database(database).await?;

    match format {
        OutputFormat::Text => println!("✓ Cleared {} record(s) for {}", removed, user),
        OutputFormat::Json => {
            let output = json!({ "user": user, "removed": removed });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show a user's history size against the budget
pub async fn handle_history_stats(user: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let (store, database) = open_store(config).await?;
    let stats = store
        .stats(user)
        .await
        .with_context(|| format!("Failed to read history for {}", user))?;
    close_database(database).await?;

    match format {
        OutputFormat::Text => {
            println!("History for {}", user);
            println!("  Backend: {}", store.backend_name());
            println!("  Records: {}", stats.records);
            println!("  Content: {} / {} chars", stats.content_len, stats.budget);
        }
        OutputFormat::Json => {
            let output = json!({
                "user": user,
                "backend": store.backend_name(),
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
