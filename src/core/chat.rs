//! Chat platform abstraction

use crate::core::store::LoggedMessage;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Identity of a message the bot has sent, used to edit it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef>;

    /// Replaces the text of a message sent earlier.
    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<()>;

    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: &str) -> Result<MessageRef>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub is_bot: bool,
}

/// A message received from a chat, already detached from the wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub sender: Option<Sender>,
    pub sent_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn username(&self) -> Option<&str> {
        self.sender.as_ref().and_then(|s| s.username.as_deref())
    }

    pub fn to_logged(&self) -> LoggedMessage {
        LoggedMessage {
            text: self.text.clone(),
            user_id: self.sender.as_ref().map_or(0, |s| s.id),
            username: self.sender.as_ref().and_then(|s| s.username.clone()),
            is_bot: self.sender.as_ref().is_some_and(|s| s.is_bot),
            message_id: self.message_id,
            sent_at: self.sent_at,
        }
    }
}
