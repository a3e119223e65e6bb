//! Parley SDK
//!
//! Shared types for Parley components: conversation turns, the payloads
//! accepted by the history store, and the error taxonomy used across the
//! engine.

/// Error types and handling
pub mod errors;

/// Conversation turn types
pub mod types;

// Re-export commonly used types
pub use errors::{DecodeError, EngineError, ParleyErrorExt, StorageError};
pub use types::{Turn, TurnPayload, ROLE_ASSISTANT, ROLE_USER};
