//! Webhook message handling
//!
//! Turns one forwarded Telegram message into at most one LLM call and one
//! Bot API reply, recording both sides of the exchange in the history store.
//! Failures become user-facing text; nothing here returns an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use sdk::errors::{EngineError, ParleyErrorExt};
use sdk::TurnPayload;

use super::access::AccessList;
use super::telegram::{IncomingMessage, TelegramClient};
use crate::history::HistoryStore;
use crate::llm::{LLMProvider, Message};

pub const RESET_TEXT: &str = "Conversation history cleared.";

pub const HELP_TEXT: &str = "Send me a message and I'll answer, remembering our recent conversation.\n\n\
     /reset - Forget the conversation so far\n\
     /help  - Show this help";

/// Kind of body returned to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    /// The gateway should deliver `body` to the user
    Text,

    /// Nothing for the gateway to deliver
    Empty,
}

/// JSON body of a `POST /message` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReply {
    #[serde(rename = "type")]
    pub kind: ReplyKind,
    pub body: String,
}

impl WebhookReply {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Text,
            body: body.into(),
        }
    }

    pub fn empty() -> Self {
        Self {
            kind: ReplyKind::Empty,
            body: String::new(),
        }
    }
}

pub struct MessageHandler {
    store: Arc<HistoryStore>,
    llm: Arc<dyn LLMProvider>,
    telegram: TelegramClient,
    access: AccessList,
    system_prompt: Option<String>,
    parse_mode: Option<String>,
}

impl MessageHandler {
    pub fn new(
        store: Arc<HistoryStore>,
        llm: Arc<dyn LLMProvider>,
        telegram: TelegramClient,
        access: AccessList,
    ) -> Self {
        Self {
            store,
            llm,
            telegram,
            access,
            system_prompt: None,
            parse_mode: None,
        }
    }

    /// Prepend this prompt to every LLM request
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    /// Parse mode for replies; an empty string sends plain text
    pub fn with_parse_mode(mut self, parse_mode: impl Into<String>) -> Self {
        let parse_mode = parse_mode.into();
        self.parse_mode = (!parse_mode.is_empty()).then_some(parse_mode);
        self
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    /// Handle one forwarded message
    pub async fn handle(&self, message: IncomingMessage) -> WebhookReply {
        // anonymous senders are refused under the chat they wrote from
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            warn!("Message {} with no user info", message.message_id);
            return refuse(EngineError::Unauthorized(message.chat.id));
        };

        if !self.access.is_allowed(user_id).await {
            warn!("Unauthorized user {} attempted to use the bot", user_id);
            return refuse(EngineError::Unauthorized(user_id));
        }

        let Some(text) = message.text.as_deref() else {
            return WebhookReply::empty();
        };

        let chat_id = message.chat.id;
        let history_key = chat_id.to_string();
        info!(user_id, chat_id, message_id = message.message_id, "Received message");

        match command_name(text) {
            Some("/reset") => return self.reset(&history_key).await,
            Some("/start") | Some("/help") => return WebhookReply::text(HELP_TEXT),
            _ => {}
        }

        match self.converse(&history_key, &message, text).await {
            Ok(reply) => self.deliver(chat_id, message.message_id, reply).await,
            Err(e) if e.is_recoverable() => {
                warn!("Could not answer message {} in chat {}: {}", message.message_id, chat_id, e);
                WebhookReply::text(e.user_hint())
            }
            Err(e) => {
                error!("Failed to answer message {} in chat {}: {}", message.message_id, chat_id, e);
                WebhookReply::text(e.user_hint())
            }
        }
    }

    async fn reset(&self, history_key: &str) -> WebhookReply {
        match self.store.clear(history_key).await {
            Ok(removed) => {
                info!(chat = history_key, removed, "Conversation reset");
                WebhookReply::text(RESET_TEXT)
            }
            Err(e) => {
                error!("Failed to reset conversation {}: {}", history_key, e);
                WebhookReply::text(e.user_hint())
            }
        }
    }

    /// Record the user turn, ask the model, record the answer
    async fn converse(
        &self,
        history_key: &str,
        message: &IncomingMessage,
        text: &str,
    ) -> Result<String, EngineError> {
        let user_record = message.message_id.to_string();
        self.store
            .append_with_id(history_key, &user_record, TurnPayload::single(sdk::ROLE_USER, text))
            .await?;

        let turns = self.store.read(history_key).await?;

        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.as_str()));
        }
        messages.extend(turns.into_iter().map(Message::from));

        let reply = self.llm.generate(&messages).await?;

        let reply_record = format!("{}_reply", message.message_id);
        if let Err(e) = self
            .store
            .append_with_id(
                history_key,
                &reply_record,
                TurnPayload::single(sdk::ROLE_ASSISTANT, reply.as_str()),
            )
            .await
        {
            warn!("Failed to record reply {} for {}: {}", reply_record, history_key, e);
        }

        Ok(reply)
    }

    /// Send through the Bot API; hand the text back to the gateway if that fails
    async fn deliver(&self, chat_id: i64, message_id: i64, reply: String) -> WebhookReply {
        match self
            .telegram
            .send_reply(chat_id, &reply, message_id, self.parse_mode.as_deref())
            .await
        {
            Ok(()) => WebhookReply::empty(),
            Err(_) => WebhookReply::text(reply),
        }
    }
}

fn refuse(error: EngineError) -> WebhookReply {
    WebhookReply::text(error.user_hint())
}

/// `/cmd@botname args` -> `/cmd`
fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    Some(first.split('@').next().unwrap_or(first))
}
