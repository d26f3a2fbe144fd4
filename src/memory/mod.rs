//! Conversation memory: the ordered message buffer behind each chat session.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemoryChatHistory;
pub use traits::{ChatHistory, ChatMessage, ChatRole};

/// Create a default in-memory chat history.
pub fn create_chat_history() -> Box<dyn ChatHistory> {
    Box::new(InMemoryChatHistory::new())
}
