//! Record codec
//!
//! Four record shapes accumulated over the life of the history store. They
//! are told apart by structure alone (no version tag is stored):
//!
//! | variant               | shape                                                              | turns |
//! |-----------------------|--------------------------------------------------------------------|-------|
//! | `UserAssistantPair`   | `{"user": u, "assistant": a}`                                      | 2     |
//! | `ConversationPair`    | `{"role": "conversation", "content": {"user_message": u, "assistant_response": a}}` | 2 |
//! | `RoleMap`             | `{"role": r, "content": c}`                                        | 1     |
//! | `SingleTagged`        | `{r: c}`                                                           | 1     |
//!
//! The table is closed: anything else is a [`DecodeError`]. Only
//! `UserAssistantPair` (for pairs) and `SingleTagged` (for lone turns) are
//! ever written.

use sdk::errors::{DecodeError, StorageError};
use sdk::types::{Turn, TurnPayload};
use serde_json::{Map, Value};
use std::fmt;

/// Which historical shape a record was stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    SingleTagged,
    ConversationPair,
    RoleMap,
    UserAssistantPair,
}

impl SchemaVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVariant::SingleTagged => "single_tagged",
            SchemaVariant::ConversationPair => "conversation_pair",
            SchemaVariant::RoleMap => "role_map",
            SchemaVariant::UserAssistantPair => "user_assistant_pair",
        }
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record decoded into its variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedRecord {
    SingleTagged {
        role: String,
        content: String,
    },
    ConversationPair {
        user_message: String,
        assistant_response: String,
    },
    RoleMap {
        role: String,
        content: String,
    },
    UserAssistantPair {
        user: String,
        assistant: String,
    },
}

impl DecodedRecord {
    pub fn variant(&self) -> SchemaVariant {
        match self {
            DecodedRecord::SingleTagged { .. } => SchemaVariant::SingleTagged,
            DecodedRecord::ConversationPair { .. } => SchemaVariant::ConversationPair,
            DecodedRecord::RoleMap { .. } => SchemaVariant::RoleMap,
            DecodedRecord::UserAssistantPair { .. } => SchemaVariant::UserAssistantPair,
        }
    }

    /// Canonical turns, pairs flattened in `(user, assistant)` order
    pub fn into_turns(self) -> Vec<Turn> {
        match self {
            DecodedRecord::SingleTagged { role, content }
            | DecodedRecord::RoleMap { role, content } => vec![Turn::new(role, content)],
            DecodedRecord::ConversationPair {
                user_message: user,
                assistant_response: assistant,
            }
            | DecodedRecord::UserAssistantPair { user, assistant } => {
                vec![Turn::user(user), Turn::assistant(assistant)]
            }
        }
    }

    /// Sum of the character lengths of every content string in the record
    pub fn content_len(&self) -> usize {
        match self {
            DecodedRecord::SingleTagged { content, .. } | DecodedRecord::RoleMap { content, .. } => {
                content.chars().count()
            }
            DecodedRecord::ConversationPair {
                user_message: user,
                assistant_response: assistant,
            }
            | DecodedRecord::UserAssistantPair { user, assistant } => {
                user.chars().count() + assistant.chars().count()
            }
        }
    }
}

/// Encode a payload in the current on-disk shape
pub fn encode(payload: &TurnPayload) -> Result<Vec<u8>, StorageError> {
    let mut map = Map::new();
    match payload {
        TurnPayload::Pair { user, assistant } => {
            map.insert("user".to_string(), Value::String(user.clone()));
            map.insert("assistant".to_string(), Value::String(assistant.clone()));
        }
        TurnPayload::Single(turn) => {
            map.insert(turn.role.clone(), Value::String(turn.content.clone()));
        }
    }
    serde_json::to_vec(&Value::Object(map)).map_err(|e| StorageError::Encode(e.to_string()))
}

/// Decode raw record bytes into one of the known variants
pub fn decode(bytes: &[u8]) -> Result<DecodedRecord, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;

    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(DecodeError::UnrecognizedShape(format!(
                "expected an object, found {}",
                json_kind(&other)
            )))
        }
    };

    if let Some(record) = match_user_assistant_pair(&map) {
        return Ok(record);
    }
    if let Some(record) = match_conversation_pair(&map) {
        return Ok(record);
    }
    if let Some(record) = match_role_map(&map) {
        return Ok(record);
    }
    if let Some(record) = match_single_tagged(&map) {
        return Ok(record);
    }

    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    Err(DecodeError::UnrecognizedShape(format!("keys {:?}", keys)))
}

fn match_user_assistant_pair(map: &Map<String, Value>) -> Option<DecodedRecord> {
    if map.len() != 2 {
        return None;
    }
    Some(DecodedRecord::UserAssistantPair {
        user: string_field(map, "user")?,
        assistant: string_field(map, "assistant")?,
    })
}

fn match_conversation_pair(map: &Map<String, Value>) -> Option<DecodedRecord> {
    if map.len() != 2 || map.get("role")?.as_str()? != "conversation" {
        return None;
    }
    let content = map.get("content")?.as_object()?;
    Some(DecodedRecord::ConversationPair {
        user_message: string_field(content, "user_message")?,
        assistant_response: string_field(content, "assistant_response")?,
    })
}

fn match_role_map(map: &Map<String, Value>) -> Option<DecodedRecord> {
    if map.len() != 2 {
        return None;
    }
    Some(DecodedRecord::RoleMap {
        role: string_field(map, "role")?,
        content: string_field(map, "content")?,
    })
}

fn match_single_tagged(map: &Map<String, Value>) -> Option<DecodedRecord> {
    if map.len() != 1 {
        return None;
    }
    let (role, content) = map.iter().next()?;
    Some(DecodedRecord::SingleTagged {
        role: role.clone(),
        content: content.as_str()?.to_string(),
    })
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)?.as_str().map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
