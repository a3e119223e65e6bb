//! Telegram bot glue
//!
//! The webhook forwards each Telegram message to [`MessageHandler`], which
//! checks the sender against the [`AccessList`], keeps the conversation in
//! the history store and answers through [`TelegramClient`].

pub mod access;
pub mod handler;
pub mod telegram;

pub use access::AccessList;
pub use handler::{MessageHandler, ReplyKind, WebhookReply};
pub use telegram::{Chat, IncomingMessage, TelegramClient, User};
