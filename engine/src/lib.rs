//! Parley Engine Library
//!
//! This library provides the core functionality of the Parley bot server.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Database persistence module
pub mod db;

/// Bounded per-user conversation history
pub mod history;

/// LLM provider abstraction layer
pub mod llm;

/// Telegram bot module
pub mod bot;

/// Webhook HTTP server
pub mod server;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
