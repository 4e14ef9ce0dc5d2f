//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text messages are delivered as-is. For photo messages the largest size is
//! passed on as a `tg-file:<file_id>` reference and the caption becomes the
//! message text. [`TelegramFiles`] downloads referenced photos on demand.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::{ChannelError, VisionError};
use crate::vision::ImageSource;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const API_BASE: &str = "https://api.telegram.org";

/// Seconds the server holds a `getUpdates` call open.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            bot_token,
            allowed_users,
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Photo downloader sharing this channel's token and HTTP client.
    pub fn files(&self) -> TelegramFiles {
        TelegramFiles {
            bot_token: self.bot_token.clone(),
            client: self.client.clone(),
        }
    }

    #[cfg(test)]
    fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    /// Send a text message, splitting it at Telegram's length limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&serde_json::json!({ "chat_id": chat_id, "text": chunk }))
                .send()
                .await
                .map_err(|e| send_failed(e.without_url().to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(send_failed(format!("sendMessage returned {status}: {body}")));
            }
        }
        Ok(())
    }
}

fn api_url(token: &SecretString, method: &str) -> String {
    format!("{API_BASE}/bot{}/{method}", token.expose_secret())
}

fn file_url(token: &SecretString, file_path: &str) -> String {
    format!("{API_BASE}/file/bot{}/{file_path}", token.expose_secret())
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason,
    }
}

// ── Update parsing ──────────────────────────────────────────────────

/// The parts of a Telegram `message` object the bot uses.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedMessage {
    user_id: String,
    username: String,
    chat_id: String,
    text: String,
    /// `file_id` of the largest attached photo size.
    photo_file_id: Option<String>,
}

/// Extract a usable message from one `getUpdates` result entry.
fn parse_update(update: &Value) -> Option<ParsedMessage> {
    let message = update.get("message")?;
    let from = message.get("from");

    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_else(|| username.clone());
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();

    // Sizes are listed smallest first
    let photo_file_id = message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
        .and_then(|p| p.get("file_id"))
        .and_then(Value::as_str)
        .map(String::from);

    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str);

    if text.is_none() && photo_file_id.is_none() {
        return None;
    }

    Some(ParsedMessage {
        user_id,
        username,
        chat_id,
        text: text.unwrap_or_default().to_string(),
        photo_file_id,
    })
}

impl ParsedMessage {
    /// Build the message handed to the bot. Photos travel as a token-free
    /// `tg-file:` reference; [`TelegramFiles`] turns it into bytes later.
    fn into_incoming(self) -> IncomingMessage {
        let incoming = IncomingMessage::new("telegram", &self.user_id, &self.text).with_metadata(
            serde_json::json!({
                "chat_id": self.chat_id,
                "username": self.username,
            }),
        );
        match &self.photo_file_id {
            Some(file_id) => incoming.with_photo(&format!("{PHOTO_REF_PREFIX}{file_id}")),
            None => incoming,
        }
    }
}

/// Prefix of photo references produced by this channel.
pub const PHOTO_REF_PREFIX: &str = "tg-file:";

/// Downloads photos referenced as `tg-file:<file_id>`. The bot token only
/// ever appears in the request URLs built here.
#[derive(Clone)]
pub struct TelegramFiles {
    bot_token: SecretString,
    client: reqwest::Client,
}

impl TelegramFiles {
    /// Resolve a `file_id` to its path on the file server.
    async fn file_path(&self, file_id: &str) -> Result<String, VisionError> {
        let failed = |reason: String| VisionError::RequestFailed(format!("getFile failed: {reason}"));

        let data: Value = self
            .client
            .post(api_url(&self.bot_token, "getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?
            .json()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?;

        data.get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| failed(format!("no file_path in response: {data}")))
    }
}

#[async_trait]
impl ImageSource for TelegramFiles {
    fn accepts(&self, image_ref: &str) -> bool {
        image_ref.starts_with(PHOTO_REF_PREFIX)
    }

    async fn fetch(&self, image_ref: &str) -> Result<Vec<u8>, VisionError> {
        let file_id = image_ref.strip_prefix(PHOTO_REF_PREFIX).unwrap_or(image_ref);
        let path = self.file_path(file_id).await?;

        let resp = self
            .client
            .get(file_url(&self.bot_token, &path))
            .send()
            .await
            .map_err(|e| VisionError::RequestFailed(e.without_url().to_string()))?;
        if !resp.status().is_success() {
            return Err(VisionError::RequestFailed(format!(
                "file download returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| VisionError::RequestFailed(e.without_url().to_string()))?;
        tracing::debug!(file_id, size = bytes.len(), "Downloaded photo from Telegram");
        Ok(bytes.to_vec())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client
                    .post(api_url(&bot_token, "getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!("Telegram getUpdates returned no result: {data}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = parse_update(update) else {
                        continue;
                    };

                    let identities = [parsed.username.as_str(), parsed.user_id.as_str()];
                    if !check_user_allowed(&allowed_users, identities) {
                        tracing::warn!(
                            username = %parsed.username,
                            user_id = %parsed.user_id,
                            "Telegram: ignoring message from unauthorized user"
                        );
                        continue;
                    }

                    let incoming = parsed.into_incoming();

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| send_failed("No chat_id in message metadata".into()))?;

        self.send_message(chat_id, &response.content).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Check if any identity matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().filter(|id| !id.is_empty()).collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char
/// boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
