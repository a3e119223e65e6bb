//! Conversation turn types
//!
//! A [`Turn`] is one `(role, content)` pair. Roles are kept as plain strings
//! because records written by older store versions may carry any role key.

use serde::{Deserialize, Serialize};

/// Role name used for the human side of a conversation
pub const ROLE_USER: &str = "user";

/// Role name used for the model side of a conversation
pub const ROLE_ASSISTANT: &str = "assistant";

/// A single turn within a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

impl Turn {
    /// Create a turn with an arbitrary role
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }

    /// Content length in characters
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// What a caller hands to the history store on append
///
/// Either one turn or a user/assistant exchange stored as one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnPayload {
    /// `{"user": "...", "assistant": "..."}`
    Pair { user: String, assistant: String },

    /// `{"role": "...", "content": "..."}`
    Single(Turn),
}

impl TurnPayload {
    /// Build a user/assistant pair payload
    pub fn pair(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self::Pair {
            user: user.into(),
            assistant: assistant.into(),
        }
    }

    /// Build a single-turn payload
    pub fn single(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Single(Turn::new(role, content))
    }

    /// Turns this payload expands to, pairs in `(user, assistant)` order
    pub fn into_turns(self) -> Vec<Turn> {
        match self {
            Self::Pair { user, assistant } => vec![Turn::user(user), Turn::assistant(assistant)],
            Self::Single(turn) => vec![turn],
        }
    }

    /// Sum of the character lengths of every content string
    pub fn content_len(&self) -> usize {
        match self {
            Self::Pair { user, assistant } => user.chars().count() + assistant.chars().count(),
            Self::Single(turn) => turn.content_len(),
        }
    }
}

impl From<Turn> for TurnPayload {
    fn from(turn: Turn) -> Self {
        Self::Single(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_expands_in_user_assistant_order() {
        let turns = TurnPayload::pair("hi", "hello").into_turns();
        assert_eq!(turns, vec![Turn::user("hi"), Turn::assistant("hello")]);
    }

    #[test]
    fn test_content_len_counts_characters_not_bytes() {
        let payload = TurnPayload::single("user", "привет");
        assert_eq!(payload.content_len(), 6);

        let pair = TurnPayload::pair("ab", "ñé");
        assert_eq!(pair.content_len(), 4);
    }

    #[test]
    fn test_payload_deserializes_both_api_shapes() {
        let single: TurnPayload =
            serde_json::from_str(r#"{"role": "user", "content": "x"}"#).unwrap();
        assert_eq!(single, TurnPayload::single("user", "x"));

        let pair: TurnPayload =
            serde_json::from_str(r#"{"user": "q", "assistant": "a"}"#).unwrap();
        assert_eq!(pair, TurnPayload::pair("q", "a"));
    }
}
