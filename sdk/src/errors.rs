//! Error types and handling
//!
//! This module provides the error types used throughout Parley.
//! All errors implement the `ParleyErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Error Categories
//!
//! - **Storage**: history persistence failures, surfaced to callers of
//!   `append`/`read`/`clear`
//! - **Decode**: a persisted record matches none of the known shapes; this
//!   never leaves the history store, it is logged and counted instead
//! - **Engine**: everything around the store (configuration, LLM, transport)

use thiserror::Error;

/// Trait for Parley error extensions
///
/// Hints are safe to show to chat users: no file paths, no tokens, no
/// internal identifiers.
pub trait ParleyErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by the caller.
    fn is_recoverable(&self) -> bool;
}

/// History storage error
///
/// Raised by the history store when the underlying storage cannot be read,
/// written or cleaned up. A failed append never reports success.
///
/// # Examples
///
/// ```
/// use sdk::errors::{ParleyErrorExt, StorageError};
///
/// let error = StorageError::Write("disk full".to_string());
/// assert!(error.is_recoverable());
///
/// let bad_id = StorageError::InvalidId("../etc".to_string());
/// assert!(!bad_id.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write history record: {0}")]
    Write(String),

    #[error("Failed to delete history record: {0}")]
    Delete(String),

    #[error("Failed to read history: {0}")]
    Read(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to encode history record: {0}")]
    Encode(String),
}

impl ParleyErrorExt for StorageError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Write(_) | Self::Encode(_) => "Could not save this message. Please try again",
            Self::Delete(_) => "Could not reset the conversation. Please try again",
            Self::Read(_) | Self::Database(_) => "Conversation history is unavailable right now",
            Self::InvalidId(_) => "This conversation cannot be stored",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidId(_) | Self::Encode(_))
    }
}

/// A persisted record that could not be turned back into turns
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Record is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Record matches no known shape: {0}")]
    UnrecognizedShape(String),
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ParleyErrorExt, StorageError};
///
/// let error: EngineError = StorageError::Delete("busy".to_string()).into();
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // History store errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Messaging transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthorized user: {0}")]
    Unauthorized(i64),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParleyErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Storage(e) => e.user_hint(),
            Self::LLMProvider(_) => "The assistant is unavailable right now. Please try again",
            Self::Transport(_) => "Could not deliver the reply",
            Self::Unauthorized(_) => "You are not authorized to use this bot.",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Unauthorized(_) => false,
            Self::Storage(e) => e.is_recoverable(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_passes_through_engine_error() {
        let error: EngineError = StorageError::InvalidId("a/b".to_string()).into();
        assert_eq!(error.user_hint(), "This conversation cannot be stored");
        assert!(!error.is_recoverable());
        assert_eq!(error.to_string(), "Invalid identifier: \"a/b\"");
    }

    #[test]
    fn test_hints_do_not_leak_details() {
        let error = StorageError::Write("/var/lib/parley/history/42 is read-only".to_string());
        assert!(!error.user_hint().contains("/var/lib"));
    }

    #[test]
    fn test_unauthorized_is_not_recoverable() {
        assert!(!EngineError::Unauthorized(7).is_recoverable());
    }
}
