//! Minimal Telegram Bot API client: long polling, text, edits and photos.

use crate::core::chat::{ChatClient, IncomingMessage, MessageRef, Sender};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

/// Longest text `sendMessage` accepts.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Splits `text` into pieces of at most `limit` characters, breaking at line
/// ends where possible.
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let chars: Vec<char> = line.chars().collect();
        let pieces: Vec<String> = if chars.is_empty() {
            vec![String::new()]
        } else {
            chars.chunks(limit).map(|c| c.iter().collect()).collect()
        };

        for piece in pieces {
            let len = piece.chars().count();
            match &mut current {
                Some((chunk, chunk_len)) if *chunk_len + 1 + len <= limit => {
                    chunk.push('\n');
                    chunk.push_str(&piece);
                    *chunk_len += 1 + len;
                }
                _ => {
                    chunks.extend(current.take().map(|(chunk, _)| chunk));
                    current = Some((piece, len));
                }
            }
        }
    }
    chunks.extend(current.map(|(chunk, _)| chunk));
    chunks
}

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telegram API error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("telegram returned ok without a result")]
    EmptyResult,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub date: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub is_bot: bool,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl From<Message> for IncomingMessage {
    fn from(message: Message) -> Self {
        IncomingMessage {
            chat_id: message.chat.id,
            message_id: message.message_id,
            text: message.text.unwrap_or_default(),
            sender: message.from.map(|user| Sender {
                id: user.id,
                username: user.username,
                is_bot: user.is_bot,
            }),
            sent_at: Utc
                .timestamp_opt(message.date, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

pub struct TelegramClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    fn unwrap_response<T>(method: &str, response: ApiResponse<T>) -> Result<T, TelegramError> {
        if !response.ok {
            return Err(TelegramError::Api {
                code: response.error_code.unwrap_or_default(),
                description: response
                    .description
                    .unwrap_or_else(|| format!("{method} failed")),
            });
        }
        response.result.ok_or(TelegramError::EmptyResult)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, TelegramError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?
            .json::<ApiResponse<T>>()
            .await?;
        Self::unwrap_response(method, response)
    }

    /// The bot's own account.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &json!({})).await
    }

    /// Long-polls for updates with `update_id >= offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &GetUpdates {
                    offset,
                    timeout: timeout_secs,
                    allowed_updates: &["message"],
                },
            )
            .await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), offset, "Received updates");
        }
        Ok(updates)
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    #[instrument(name = "TelegramSend", skip(self, text))]
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef> {
        let message: Message = self
            .call("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(MessageRef {
            chat_id: message.chat.id,
            message_id: message.message_id,
        })
    }

    #[instrument(name = "TelegramEdit", skip(self, text))]
    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<()> {
        // Result is either the edited message or `true`; only success matters.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    #[instrument(name = "TelegramPhoto", skip(self, png, caption), fields(bytes = png.len()))]
    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: &str) -> Result<MessageRef> {
        let photo = Part::bytes(png)
            .file_name("chart.png")
            .mime_str("image/png")
            .map_err(TelegramError::from)?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(TelegramError::from)?
            .json::<ApiResponse<Message>>()
            .await
            .map_err(TelegramError::from)?;
        let message = Self::unwrap_response("sendPhoto", response)?;
        Ok(MessageRef {
            chat_id: message.chat.id,
            message_id: message.message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123:abc";

    fn sent_message(chat_id: i64, message_id: i64) -> serde_json::Value {
        json!({
            "ok": true,
            "result": {
                "message_id": message_id,
                "date": 1704067200,
                "chat": { "id": chat_id, "type": "private" },
                "text": "whatever"
            }
        })
    }

    #[tokio::test]
    async fn test_send_text() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_partial_json(json!({ "chat_id": 42, "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(42, 7)))
            .expect(1)
            .mount(&mock_server)
            .await;
        let client = TelegramClient::new(&mock_server.uri(), TOKEN);

        let sent = client.send_text(42, "hello").await.unwrap();
        assert_eq!(
            sent,
            MessageRef {
                chat_id: 42,
                message_id: 7
            }
        );
    }

    #[tokio::test]
    async fn test_edit_text_accepts_boolean_result() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/editMessageText")))
            .and(body_partial_json(json!({ "chat_id": 42, "message_id": 7 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": true })))
            .expect(1)
            .mount(&mock_server)
            .await;
        let client = TelegramClient::new(&mock_server.uri(), TOKEN);

        let message = MessageRef {
            chat_id: 42,
            message_id: 7,
        };
        client.edit_text(message, "50%").await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&mock_server)
            .await;
        let client = TelegramClient::new(&mock_server.uri(), TOKEN);

        let err = client.send_text(1, "hi").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_get_updates_converts_messages() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .and(body_partial_json(json!({ "offset": 10, "timeout": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{
                    "update_id": 10,
                    "message": {
                        "message_id": 3,
                        "date": 1704067200,
                        "chat": { "id": 99, "type": "private" },
                        "from": { "id": 5, "is_bot": false, "first_name": "A", "username": "alice" },
                        "text": "/start"
                    }
                }, {
                    "update_id": 11
                }]
            })))
            .mount(&mock_server)
            .await;
        let client = TelegramClient::new(&mock_server.uri(), TOKEN);

        let updates = client.get_updates(10, 0).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates[1].message.is_none());

        let incoming = IncomingMessage::from(updates[0].message.clone().unwrap());
        assert_eq!(incoming.chat_id, 99);
        assert_eq!(incoming.text, "/start");
        assert_eq!(incoming.username(), Some("alice"));
        assert_eq!(incoming.sent_at.timestamp(), 1704067200);
    }

    #[tokio::test]
    async fn test_get_me() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getMe")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "id": 1, "is_bot": true, "first_name": "Rates", "username": "rate_bot" }
            })))
            .mount(&mock_server)
            .await;
        let client = TelegramClient::new(&mock_server.uri(), TOKEN);

        let me = client.get_me().await.unwrap();
        assert!(me.is_bot);
        assert_eq!(me.username.as_deref(), Some("rate_bot"));
    }

    #[test]
    fn test_split_text() {
        assert_eq!(split_text("a\nb", 10), vec!["a\nb"]);
        assert_eq!(split_text("aaa\nbbb\ncc", 7), vec!["aaa\nbbb", "cc"]);
        // A line longer than the limit is cut.
        assert_eq!(split_text("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(split_text("", 5), vec![""]);

        let long: String = (0..1000).map(|i| format!("message number {i}\n")).collect();
        let chunks = split_text(&long, MAX_MESSAGE_CHARS);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(chunks.join("\n"), long);
    }

    #[tokio::test]
    async fn test_send_photo_is_multipart() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendPhoto")))
            .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(42, 8)))
            .expect(1)
            .mount(&mock_server)
            .await;
        let client = TelegramClient::new(&mock_server.uri(), TOKEN);

        let sent = client
            .send_photo(42, vec![0x89, b'P', b'N', b'G'], "USD → EUR")
            .await
            .unwrap();
        assert_eq!(sent.message_id, 8);

        let requests = mock_server.received_requests().await.unwrap();
        let content_type = requests[0]
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data"));
    }
}
