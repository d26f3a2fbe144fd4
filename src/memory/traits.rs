//! Chat history traits and message types.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a history entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single role-tagged message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered message buffer backing one conversation.
///
/// Every operation is fallible so that storage backends other than the
/// in-memory buffer can surface their failures to the conversation.
#[async_trait]
pub trait ChatHistory: Send + Sync {
    /// Remove every stored message.
    async fn clear(&self) -> Result<()>;

    /// Append a message at the end of the history.
    async fn add_message(&self, message: ChatMessage) -> Result<()>;

    /// Snapshot of the history, oldest first.
    async fn messages(&self) -> Result<Vec<ChatMessage>>;

    async fn add_user_message(&self, content: &str) -> Result<()> {
        self.add_message(ChatMessage::user(content)).await
    }

    async fn add_ai_message(&self, content: &str) -> Result<()> {
        self.add_message(ChatMessage::assistant(content)).await
    }

    /// The name of this history backend.
    fn name(&self) -> &str;
}
