//! In-memory chat history implementation.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{ChatHistory, ChatMessage};

/// A conversation buffer held entirely in process memory. Never fails.
pub struct InMemoryChatHistory {
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryChatHistory {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryChatHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatHistory for InMemoryChatHistory {
    async fn clear(&self) -> Result<()> {
        self.messages.lock().clear();
        Ok(())
    }

    async fn add_message(&self, message: ChatMessage) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }

    async fn messages(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.messages.lock().clone())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
