use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::sessions::ChatId;

/// Kind of conversation scope a message arrived in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Multi-party scope where the bot only answers when addressed.
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// A formatting span inside a message text.
///
/// `offset` and `length` count UTF-16 code units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEntity {
    pub kind: String,
    pub offset: usize,
    pub length: usize,
}

/// The message an inbound message replies to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepliedMessage {
    pub message_id: i64,
    pub text: String,
}

/// A text message received from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: i64,
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub text: String,
    pub reply_to: Option<RepliedMessage>,
    pub entities: Vec<MessageEntity>,
}

impl InboundMessage {
    /// Text covered by `entity`, or `None` when the span is out of range.
    pub fn entity_text(&self, entity: &MessageEntity) -> Option<String> {
        let units: Vec<u16> = self.text.encode_utf16().collect();
        let end = entity.offset.checked_add(entity.length)?;
        let span = units.get(entity.offset..end)?;
        String::from_utf16(span).ok()
    }
}

/// How the platform should render a reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReplyFormat {
    Plain,
    Markdown,
}

/// A reply to send back to the chat the triggering message came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundReply {
    pub chat_id: ChatId,
    pub reply_to_message_id: Option<i64>,
    pub text: String,
    pub format: ReplyFormat,
}

impl OutboundReply {
    /// Plain-text reply to `message`.
    pub fn to(message: &InboundMessage, text: impl Into<String>) -> Self {
        Self {
            chat_id: message.chat_id,
            reply_to_message_id: Some(message.message_id),
            text: text.into(),
            format: ReplyFormat::Plain,
        }
    }

    pub fn with_format(mut self, format: ReplyFormat) -> Self {
        self.format = format;
        self
    }
}

/// Core channel trait. Implement for any messaging platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    /// Username the bot is addressed by, without the leading `@`.
    fn bot_username(&self) -> &str;

    /// Send a reply through this channel
    async fn send(&self, reply: &OutboundReply) -> Result<()>;

    /// Forward inbound messages into `tx` until `shutdown` flips to `true`.
    async fn listen(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()>;
}
