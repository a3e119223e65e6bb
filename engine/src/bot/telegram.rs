//! Telegram Bot API client
//!
//! Only `sendMessage` is needed: updates arrive through the webhook rather
//! than long polling.

use reqwest::Client;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

/// A Telegram message as forwarded to `POST /message`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMsgReq<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

#[derive(Clone)]
pub struct TelegramClient {
    api_url: String,
    token: String,
    client: Client,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl TelegramClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Call `sendMessage` once
    ///
    /// Fails when the request cannot be sent or the Bot API answers with
    /// `ok: false` (for example when the text does not parse in `parse_mode`).
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
        parse_mode: Option<&str>,
    ) -> Result<(), EngineError> {
        let req = SendMsgReq {
            chat_id,
            text,
            reply_to_message_id: reply_to,
            parse_mode,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&req)
            .send()
            .await
            .map_err(|e| EngineError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Transport(format!("Bad Bot API response ({}): {}", status, e)))?;

        if !body.ok {
            return Err(EngineError::Transport(
                body.description
                    .unwrap_or_else(|| format!("sendMessage returned {}", status)),
            ));
        }

        Ok(())
    }

    /// Send a reply, falling back to plain text if the formatted send fails
    pub async fn send_reply(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: i64,
        parse_mode: Option<&str>,
    ) -> Result<(), EngineError> {
        match self
            .send_message(chat_id, text, Some(reply_to), parse_mode)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if parse_mode.is_some() => {
                warn!("Formatted send to {} failed, retrying as plain text: {}", chat_id, e);
                self.send_message(chat_id, text, None, None)
                    .await
                    .inspect_err(|e| error!("Plain send to {} failed: {}", chat_id, e))
            }
            Err(e) => {
                error!("Failed to send message to {}: {}", chat_id, e);
                Err(e)
            }
        }
    }
}
