//! Session storage traits and types for per-chat conversation state.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::conversation::Conversation;

/// Identifier of a conversation scope (private dialog or group).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Registry owning one [`Conversation`] per chat.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the chat's conversation, creating and registering an empty one
    /// if none exists. Concurrent callers for the same chat observe the same
    /// instance; creation happens exactly once.
    async fn get_or_create(&self, chat_id: ChatId) -> Result<Arc<Conversation>>;

    /// Non-creating lookup.
    async fn get(&self, chat_id: ChatId) -> Result<Option<Arc<Conversation>>>;

    /// Number of registered conversations.
    async fn len(&self) -> Result<usize>;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}

/// Per-chat "next message is persona text" flags.
#[async_trait]
pub trait PendingActionStore: Send + Sync {
    /// Current flag value. Chats never set read as `false`.
    async fn is_waiting_for_role(&self, chat_id: ChatId) -> Result<bool>;

    /// Unconditionally set the flag.
    async fn set_waiting_for_role(&self, chat_id: ChatId, waiting: bool) -> Result<()>;

    /// Atomically read the flag and clear it. Returns the value seen before
    /// clearing; at most one concurrent caller per set observes `true`.
    async fn take_waiting_for_role(&self, chat_id: ChatId) -> Result<bool>;

    /// The name of this store implementation.
    fn name(&self) -> &str;
}
