//! In-memory session and pending-action stores.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::conversation::Conversation;
use super::traits::{ChatId, PendingActionStore, SessionStore};
use crate::memory::create_chat_history;
use crate::providers::Provider;

/// Builds the conversation for a chat seen for the first time.
pub type ConversationFactory = Arc<dyn Fn(ChatId) -> Conversation + Send + Sync>;

/// A session store backed by a reader/writer-locked hash map.
///
/// Lookups share the read lock; creation takes the write lock and re-checks
/// the map before inserting, so a chat never gets two conversations.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<ChatId, Arc<Conversation>>>,
    factory: ConversationFactory,
}

impl InMemorySessionStore {
    /// Store whose conversations all talk to `provider` with in-memory history.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self::with_factory(Arc::new(move |_: ChatId| {
            Conversation::new(Arc::clone(&provider), create_chat_history())
        }))
    }

    pub fn with_factory(factory: ConversationFactory) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, chat_id: ChatId) -> Result<Arc<Conversation>> {
        if let Some(existing) = self.sessions.read().get(&chat_id) {
            return Ok(Arc::clone(existing));
        }

        let mut sessions = self.sessions.write();
        let conversation = sessions.entry(chat_id).or_insert_with(|| {
            tracing::debug!(%chat_id, "creating conversation");
            Arc::new((self.factory)(chat_id))
        });
        Ok(Arc::clone(conversation))
    }

    async fn get(&self, chat_id: ChatId) -> Result<Option<Arc<Conversation>>> {
        Ok(self.sessions.read().get(&chat_id).cloned())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.sessions.read().len())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

/// Pending-role flags behind their own reader/writer lock.
pub struct InMemoryPendingActionStore {
    waiting_for_role: RwLock<HashMap<ChatId, bool>>,
}

impl InMemoryPendingActionStore {
    pub fn new() -> Self {
        Self {
            waiting_for_role: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPendingActionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PendingActionStore for InMemoryPendingActionStore {
    async fn is_waiting_for_role(&self, chat_id: ChatId) -> Result<bool> {
        Ok(self
            .waiting_for_role
            .read()
            .get(&chat_id)
            .copied()
            .unwrap_or(false))
    }

    async fn set_waiting_for_role(&self, chat_id: ChatId, waiting: bool) -> Result<()> {
        self.waiting_for_role.write().insert(chat_id, waiting);
        Ok(())
    }

    async fn take_waiting_for_role(&self, chat_id: ChatId) -> Result<bool> {
        let mut flags = self.waiting_for_role.write();
        match flags.get_mut(&chat_id) {
            Some(flag) => Ok(std::mem::replace(flag, false)),
            None => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
