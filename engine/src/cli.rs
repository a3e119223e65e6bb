//! CLI interface for Parley
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running the bot server and
//! inspecting stored conversation history.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley Telegram assistant
///
/// A Telegram bot webhook that answers through an OpenAI-compatible model and
/// keeps a bounded, persistent conversation history per chat.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the webhook server
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Inspect or clear stored conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

/// History management actions
#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// Print a user's conversation, oldest turn first
    Show {
        /// History key (the Telegram chat id)
        user: String,
    },

    /// Delete every stored record for a user
    Clear {
        /// History key (the Telegram chat id)
        user: String,
    },

    /// Show record count and content length against the budget
    Stats {
        /// History key (the Telegram chat id)
        user: String,
    },
}
