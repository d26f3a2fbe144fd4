//! A single chat's conversation: persona, history and the backend binding.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::memory::{ChatHistory, ChatMessage};
use crate::providers::Provider;

/// Build the system prompt that installs `role` as the active persona.
pub fn persona_prompt(role: &str) -> String {
    format!(
        "Отныне ты - {role}. Ты должен отвечать на вопросы и помогать пользователю в соответствии с этой ролью."
    )
}

/// One chat's message history bound to an AI backend.
///
/// At most one system message exists and it is always the oldest entry.
/// Persona changes and replies run under a per-conversation turn lock, so
/// two messages from the same chat never interleave their history writes.
pub struct Conversation {
    history: Box<dyn ChatHistory>,
    provider: Arc<dyn Provider>,
    turn: Mutex<()>,
}

impl Conversation {
    pub fn new(provider: Arc<dyn Provider>, history: Box<dyn ChatHistory>) -> Self {
        Self {
            history,
            provider,
            turn: Mutex::new(()),
        }
    }

    /// Drop the whole history and start over with `role` as the persona.
    pub async fn assign_persona(&self, role: &str) -> Result<()> {
        let _turn = self.turn.lock().await;

        self.history
            .clear()
            .await
            .context("failed to clear chat history")?;

        self.history
            .add_message(ChatMessage::system(persona_prompt(role)))
            .await
            .context("failed to add persona message")
    }

    /// Record `text` as a user message, ask the backend, and record its answer.
    ///
    /// When the backend fails the user message stays in the history without a
    /// matching answer. When storing the answer fails the reply is discarded
    /// and the error returned.
    pub async fn respond(&self, text: &str) -> Result<String> {
        let _turn = self.turn.lock().await;

        self.history
            .add_user_message(text)
            .await
            .context("failed to add user message")?;

        let history = self
            .history
            .messages()
            .await
            .context("failed to get chat history")?;

        let response = self
            .provider
            .generate(&history)
            .await
            .context("failed to generate content")?;
        let answer = response.first_text()?.to_string();

        self.history
            .add_ai_message(&answer)
            .await
            .context("failed to add AI message")?;

        Ok(answer)
    }

    /// Snapshot of the conversation history, oldest first.
    pub async fn history(&self) -> Result<Vec<ChatMessage>> {
        self.history.messages().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::{ChatRole, InMemoryChatHistory};
    use crate::providers::GenerateResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Backend double that answers with a fixed text and records every request.
    pub(crate) struct ScriptedProvider {
        pub answer: String,
        pub fail: AtomicBool,
        pub requests: SyncMutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        pub(crate) fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.to_string(),
                fail: AtomicBool::new(false),
                requests: SyncMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, messages: &[ChatMessage]) -> Result<GenerateResponse> {
            self.requests.lock().push(messages.to_vec());
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("quota exceeded");
            }
            Ok(GenerateResponse::from_text(self.answer.clone()))
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// History whose individual operations can be made to fail.
    #[derive(Default)]
    struct FlakyHistory {
        inner: InMemoryChatHistory,
        fail_clear: bool,
        fail_assistant_append: bool,
    }

    #[async_trait]
    impl ChatHistory for FlakyHistory {
        async fn clear(&self) -> Result<()> {
            if self.fail_clear {
                anyhow::bail!("storage offline");
            }
            self.inner.clear().await
        }

        async fn add_message(&self, message: ChatMessage) -> Result<()> {
            if self.fail_assistant_append && message.role == ChatRole::Assistant {
                anyhow::bail!("storage full");
            }
            self.inner.add_message(message).await
        }

        async fn messages(&self) -> Result<Vec<ChatMessage>> {
            self.inner.messages().await
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn conversation(provider: Arc<ScriptedProvider>) -> Conversation {
        Conversation::new(provider, Box::new(InMemoryChatHistory::new()))
    }

    #[tokio::test]
    async fn assign_persona_leaves_single_system_message() {
        let convo = conversation(ScriptedProvider::answering("ok"));
        convo.respond("hello").await.unwrap();

        convo.assign_persona("helpful pirate").await.unwrap();

        let history = convo.history().await.unwrap();
        assert_eq!(history, vec![ChatMessage::system(persona_prompt("helpful pirate"))]);
        assert!(history[0].content.contains("helpful pirate"));
    }

    #[tokio::test]
    async fn reassigning_persona_replaces_previous_one() {
        let convo = conversation(ScriptedProvider::answering("ok"));
        convo.assign_persona("pirate").await.unwrap();
        convo.assign_persona("poet").await.unwrap();

        let history = convo.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, persona_prompt("poet"));
    }

    #[tokio::test]
    async fn respond_sends_full_history_and_records_answer() {
        let provider = ScriptedProvider::answering("4");
        let convo = conversation(provider.clone());
        convo.assign_persona("math tutor").await.unwrap();

        let reply = convo.respond("What's 2+2?").await.unwrap();
        assert_eq!(reply, "4");

        let sent = provider.requests.lock().clone();
        assert_eq!(
            sent,
            vec![vec![
                ChatMessage::system(persona_prompt("math tutor")),
                ChatMessage::user("What's 2+2?"),
            ]]
        );

        let history = convo.history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2], ChatMessage::assistant("4"));
    }

    #[tokio::test]
    async fn backend_failure_keeps_user_message_only() {
        let provider = ScriptedProvider::answering("unused");
        provider.fail.store(true, Ordering::SeqCst);
        let convo = conversation(provider);

        let err = convo.respond("hi").await.unwrap_err();
        assert!(format!("{err:#}").contains("quota exceeded"));

        let history = convo.history().await.unwrap();
        assert_eq!(history, vec![ChatMessage::user("hi")]);
    }

    #[tokio::test]
    async fn blank_answer_is_an_error_and_not_stored() {
        let provider = ScriptedProvider::answering("");
        let convo = conversation(provider.clone());

        let err = convo.respond("hi").await.unwrap_err();
        assert!(format!("{err:#}").contains("no answer"));

        let history = convo.history().await.unwrap();
        assert_eq!(history, vec![ChatMessage::user("hi")]);

        // The next turn sends no empty model message.
        convo.respond("again").await.unwrap_err();
        let last_request = provider.requests.lock().last().cloned().unwrap();
        assert!(last_request.iter().all(|m| m.role != ChatRole::Assistant));
    }

    #[tokio::test]
    async fn clear_failure_propagates_from_assign_persona() {
        let history = FlakyHistory {
            fail_clear: true,
            ..FlakyHistory::default()
        };
        let convo = Conversation::new(ScriptedProvider::answering("ok"), Box::new(history));

        let err = convo.assign_persona("pirate").await.unwrap_err();
        assert!(err.to_string().contains("failed to clear chat history"));
        assert!(convo.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn answer_append_failure_discards_reply() {
        let history = FlakyHistory {
            fail_assistant_append: true,
            ..FlakyHistory::default()
        };
        let convo = Conversation::new(ScriptedProvider::answering("4"), Box::new(history));

        let result = convo.respond("What's 2+2?").await;
        let err = result.expect_err("reply must not be returned when it cannot be stored");
        assert!(err.to_string().contains("failed to add AI message"));
        assert_eq!(
            convo.history().await.unwrap(),
            vec![ChatMessage::user("What's 2+2?")]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_replies_in_one_chat_do_not_interleave() {
        let convo = Arc::new(conversation(ScriptedProvider::answering("pong")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let convo = Arc::clone(&convo);
            handles.push(tokio::spawn(async move {
                convo.respond(&format!("ping {i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let history = convo.history().await.unwrap();
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, ChatRole::User);
            assert_eq!(pair[1], ChatMessage::assistant("pong"));
        }
    }
}
