//! Google Gemini provider speaking the Generative Language `generateContent` API.

use crate::memory::{ChatMessage, ChatRole};
use crate::providers::traits::{Choice, GenerateResponse, Provider, ProviderError};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    safety_settings: Vec<SafetySetting>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiProvider {
    pub fn new(api_key: Option<&str>, model: Option<&str>, temperature: f64) -> Self {
        Self::with_base_url(None, api_key, model, temperature)
    }

    pub fn with_base_url(
        base_url: Option<&str>,
        api_key: Option<&str>,
        model: Option<&str>,
        temperature: f64,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.map(ToString::to_string),
            model: model
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            temperature,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn generate_url(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!("{}/models/{model}:generateContent", self.base_url)
    }
}

/// Map the ordered history onto Gemini's request shape. System entries
/// become the system instruction; the rest keep their order.
fn build_request(messages: &[ChatMessage], temperature: f64) -> GenerateContentRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::with_capacity(messages.len());

    for message in messages {
        let role = match message.role {
            ChatRole::System => {
                system_parts.push(Part {
                    text: message.content.clone(),
                });
                continue;
            }
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        };
        contents.push(Content {
            role: Some(role),
            parts: vec![Part {
                text: message.content.clone(),
            }],
        });
    }

    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: system_parts,
        })
    };

    GenerateContentRequest {
        contents,
        system_instruction,
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
        generation_config: GenerationConfig { temperature },
    }
}

fn into_generate_response(response: GenerateContentResponse) -> anyhow::Result<GenerateResponse> {
    let mut dropped_reason = None;
    let mut choices = Vec::with_capacity(response.candidates.len());

    for candidate in response.candidates {
        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        // An empty model turn is rejected by the API once it is part of the history.
        if text.trim().is_empty() {
            dropped_reason = dropped_reason.or(candidate.finish_reason);
            continue;
        }

        choices.push(Choice {
            content: text,
            finish_reason: candidate.finish_reason,
        });
    }

    if choices.is_empty() {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            anyhow::bail!("gemini blocked the prompt: {reason}");
        }
        if let Some(reason) = dropped_reason {
            return Err(anyhow::Error::new(ProviderError::EmptyResponse)
                .context(format!("gemini returned no text (finish reason {reason})")));
        }
        return Err(ProviderError::EmptyResponse.into());
    }

    Ok(GenerateResponse { choices })
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn generate(&self, messages: &[ChatMessage]) -> anyhow::Result<GenerateResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey {
                provider: "gemini".to_string(),
            })?;

        let request = build_request(messages, self.temperature);

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .context("gemini request failed")?;

        if !response.status().is_success() {
            return Err(super::api_error("gemini", response).await);
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .context("failed to decode gemini response")?;

        into_generate_response(body)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
