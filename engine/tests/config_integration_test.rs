//! Integration tests for configuration management
//!
//! These tests verify that a config file on disk is loaded, validated and
//! resolved into the paths the history store uses.

use parley_engine::config::{Config, HistoryBackendKind};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_config_file_loading() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[core]
data_dir = "/var/lib/parley"
log_level = "debug"

[history]
budget = 1200
backend = "sqlite"
db_file = "chats.db"

[telegram]
api_url = "http://localhost:8081"
allowed_users = [111, 222]
users_file = "~/users.txt"
parse_mode = ""

[llm]
model = "gpt-4o-mini"
system_prompt = "You are terse."
timeout_secs = 15

[server]
bind = "0.0.0.0:8000"
auth_token = "gateway-secret"
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.history.budget, 1200);
    assert_eq!(config.history.backend, HistoryBackendKind::Sqlite);
    assert_eq!(config.db_path(), PathBuf::from("/var/lib/parley/chats.db"));
    assert_eq!(config.telegram.allowed_users, vec![111, 222]);
    assert_eq!(
        config.telegram.users_file,
        Some(dirs::home_dir().unwrap().join("users.txt"))
    );
    assert_eq!(config.llm.timeout_secs, 15);
    assert_eq!(config.llm.system_prompt.as_deref(), Some("You are terse."));
    assert_eq!(config.server.auth_token.as_deref(), Some("gateway-secret"));
}

#[test]
fn test_partial_config_uses_defaults() {
    let config = Config::from_toml("[history]\nbudget = 10\n").unwrap();

    assert_eq!(config.history.budget, 10);
    assert_eq!(config.history.backend, HistoryBackendKind::Files);
    assert_eq!(config.telegram.api_url, "https://api.telegram.org");
    assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    assert_eq!(config.history_dir(), dirs::home_dir().unwrap().join(".parley/history"));
}

#[test]
fn test_unknown_backend_is_rejected() {
    assert!(Config::from_toml("[history]\nbackend = \"redis\"\n").is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(Config::load_from_path(&dir.path().join("absent.toml")).is_err());
}
