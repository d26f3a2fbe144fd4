//! Provider traits and response types for LLM backends.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::memory::ChatMessage;

/// One candidate answer returned by a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    pub content: String,
    pub finish_reason: Option<String>,
}

/// Backend response to a generate call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub choices: Vec<Choice>,
}

impl GenerateResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                content: text.into(),
                finish_reason: None,
            }],
        }
    }

    /// Text of the primary choice. A response without choices, or whose
    /// primary choice is blank, is an error.
    pub fn first_text(&self) -> Result<&str, ProviderError> {
        self.choices
            .first()
            .map(|c| c.content.as_str())
            .filter(|text| !text.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// Typed failures surfaced by provider implementations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} API key is not configured")]
    MissingApiKey { provider: String },
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("backend returned no answer text")]
    EmptyResponse,
}

/// A conversational AI backend.
///
/// Receives the full ordered history (roles preserved) and answers
/// synchronously from the caller's point of view.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<GenerateResponse>;

    /// Model the provider sends requests to.
    fn model(&self) -> &str;

    fn name(&self) -> &str;
}
