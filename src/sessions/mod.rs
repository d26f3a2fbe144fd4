//! Session management: one conversation per chat plus the pending-role flags.

pub mod conversation;
pub mod in_memory;
pub mod traits;

pub use conversation::{persona_prompt, Conversation};
pub use in_memory::{ConversationFactory, InMemoryPendingActionStore, InMemorySessionStore};
pub use traits::{ChatId, PendingActionStore, SessionStore};

use std::sync::Arc;

use crate::providers::Provider;

/// Create a default in-memory session store bound to `provider`.
pub fn create_session_store(provider: Arc<dyn Provider>) -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::new(provider))
}

/// Create a default in-memory pending-action store.
pub fn create_pending_action_store() -> Arc<dyn PendingActionStore> {
    Arc::new(InMemoryPendingActionStore::new())
}
