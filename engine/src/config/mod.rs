//! Configuration management
//!
//! This module handles loading, validation, and management of the Parley
//! configuration. Configuration is stored in TOML format at
//! ~/.parley/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory and log level
//! - **history**: Conversation history budget and storage backend
//! - **telegram**: Bot API endpoint, token and allow list
//! - **llm**: OpenAI-compatible endpoint used to produce replies
//! - **server**: Webhook listener address and shared secret
//!
//! # Path Expansion
//!
//! `~` in `core.data_dir` and `telegram.users_file` is expanded to the
//! user's home directory. Relative history paths are resolved against the
//! data directory.
//!
//! # Secrets
//!
//! The bot token and LLM API key may be written in the file, but the
//! `PARLEY_TELEGRAM_TOKEN` and `OPENAI_API_KEY` environment variables win.
//!
//! # Examples
//!
//! ```no_run
//! use parley_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("History budget: {}", config.history.budget);
//! println!("History dir: {:?}", config.history_dir());
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding `telegram.token`
pub const TELEGRAM_TOKEN_ENV: &str = "PARLEY_TELEGRAM_TOKEN";

/// Environment variable overriding `llm.api_key`
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Conversation history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Telegram Bot API settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// LLM provider settings
    #[serde(default)]
    pub llm: LLMConfig,

    /// Webhook server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Which backend stores history records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackendKind {
    /// One JSON file per record under `history.dir`
    Files,

    /// Rows in the SQLite database at `history.db_file`
    Sqlite,
}

/// Conversation history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum total content length kept per user, in characters
    #[serde(default = "default_history_budget")]
    pub budget: usize,

    /// Storage backend
    #[serde(default = "default_history_backend")]
    pub backend: HistoryBackendKind,

    /// Record directory for the files backend (relative to data_dir)
    #[serde(default = "default_history_dir")]
    pub dir: PathBuf,

    /// Database file for the sqlite backend (relative to data_dir)
    #[serde(default = "default_db_file")]
    pub db_file: PathBuf,
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL (a local Bot API server works too)
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,

    /// Bot token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Numeric user ids allowed to talk to the bot
    #[serde(default)]
    pub allowed_users: Vec<i64>,

    /// Optional allow list file, one user id per line, re-read per message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_file: Option<PathBuf>,

    /// Parse mode for replies; the reply is resent as plain text if rejected
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
}

/// LLM provider configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL for the API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// System prompt prepended to every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Webhook server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Shared secret expected in the Authorization header, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.parley")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_history_budget() -> usize {
    crate::history::DEFAULT_BUDGET
}

fn default_history_backend() -> HistoryBackendKind {
    HistoryBackendKind::Files
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}

fn default_db_file() -> PathBuf {
    PathBuf::from("parley.db")
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_parse_mode() -> String {
    "Markdown".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            budget: default_history_budget(),
            backend: default_history_backend(),
            dir: default_history_dir(),
            db_file: default_db_file(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: default_telegram_api_url(),
            token: None,
            allowed_users: Vec::new(),
            users_file: None,
            parse_mode: default_parse_mode(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            system_prompt: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.parley/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.parley/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".parley").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            history: HistoryConfig::default(),
            telegram: TelegramConfig::default(),
            llm: LLMConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Directory holding per-user record directories (files backend)
    pub fn history_dir(&self) -> PathBuf {
        self.core.data_dir.join(&self.history.dir)
    }

    /// SQLite database path (sqlite backend)
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join(&self.history.db_file)
    }

    /// Bot token, environment first
    pub fn telegram_token(&self) -> Option<String> {
        std::env::var(TELEGRAM_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.telegram.token.clone())
    }

    /// LLM API key, environment first
    pub fn llm_api_key(&self) -> Option<String> {
        std::env::var(OPENAI_API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.llm.api_key.clone())
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level and history budget
    /// - Expands ~ in paths
    ///
    /// Directories are created lazily by the components that use them.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.history.budget == 0 {
            return Err(EngineError::Config(
                "history.budget must be greater than 0".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if let Some(users_file) = &self.telegram.users_file {
            self.telegram.users_file = Some(expand_path(users_file)?);
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.history.budget, 4000);
        assert_eq!(config.history.backend, HistoryBackendKind::Files);
        assert_eq!(config.telegram.parse_mode, "Markdown");
        assert_eq!(config.llm.model, "gpt-4");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.history.budget, 4000);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let result = Config::from_toml("[history]\nbudget = 0\n");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        let result = Config::from_toml("[core]\nlog_level = \"loud\"\n");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_history_paths_resolve_against_data_dir() {
        let config = Config::from_toml(
            r#"
[core]
data_dir = "/srv/parley"

[history]
backend = "sqlite"
"#,
        )
        .unwrap();

        assert_eq!(config.history.backend, HistoryBackendKind::Sqlite);
        assert_eq!(config.history_dir(), PathBuf::from("/srv/parley/history"));
        assert_eq!(config.db_path(), PathBuf::from("/srv/parley/parley.db"));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.history.budget, deserialized.history.budget);
        assert_eq!(config.history.backend, deserialized.history.backend);
    }
}
