//! The `Channel` trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// One message from a user, normalised across transports.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that produced the message.
    pub channel: String,
    pub user_id: String,
    pub text: String,
    /// Location of an attached photo; empty when there is none.
    pub photo_ref: String,
    /// Transport-specific routing data (e.g. Telegram `chat_id`).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            photo_ref: String::new(),
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_photo(mut self, photo_ref: &str) -> Self {
        self.photo_ref = photo_ref.to_string();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn has_photo(&self) -> bool {
        !self.photo_ref.is_empty()
    }
}

/// A reply to send back on the originating channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving. The stream ends when the transport closes.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver a reply to the sender of `msg`.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_has_no_photo() {
        let msg = IncomingMessage::new("cli", "local-user", "hello");
        assert_eq!(msg.channel, "cli");
        assert!(!msg.has_photo());
        assert!(msg.metadata.is_null());
    }

    #[test]
    fn builder_sets_photo_and_metadata() {
        let msg = IncomingMessage::new("telegram", "42", "lunch")
            .with_photo("https://img/1.jpg")
            .with_metadata(serde_json::json!({"chat_id": "42"}));
        assert!(msg.has_photo());
        assert_eq!(msg.metadata["chat_id"], "42");
    }
}
