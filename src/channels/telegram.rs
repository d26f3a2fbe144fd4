use super::traits::{
    Channel, ChatKind, InboundMessage, MessageEntity, OutboundReply, RepliedMessage, ReplyFormat,
};
use crate::config::TelegramConfig;
use crate::infra::shutdown;
use crate::sessions::ChatId;
use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bot API call that came back with `ok: false`.
#[derive(Debug, thiserror::Error)]
#[error("Telegram {method} failed ({code}): {description}")]
pub struct TelegramApiError {
    pub method: String,
    pub code: i64,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
    #[serde(default)]
    entities: Vec<Entity>,
    reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: ChatKind,
}

#[derive(Debug, Deserialize)]
struct Entity {
    #[serde(rename = "type")]
    kind: String,
    offset: usize,
    length: usize,
}

/// Convert a Bot API message into the channel-neutral shape. Messages
/// without text (stickers, photos, service messages) are skipped.
fn into_inbound(message: Message) -> Option<InboundMessage> {
    let text = message.text?;
    let reply_to = message.reply_to_message.map(|replied| RepliedMessage {
        message_id: replied.message_id,
        text: replied.text.unwrap_or_default(),
    });

    Some(InboundMessage {
        message_id: message.message_id,
        chat_id: ChatId(message.chat.id),
        chat_kind: message.chat.kind,
        text,
        reply_to,
        entities: message
            .entities
            .into_iter()
            .map(|e| MessageEntity {
                kind: e.kind,
                offset: e.offset,
                length: e.length,
            })
            .collect(),
    })
}

/// Telegram channel. Long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    bot_username: String,
    api_base_url: String,
    poll_timeout_secs: u64,
    request_timeout: Duration,
    drop_pending_updates: bool,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Build the channel and resolve the bot's username with `getMe`.
    ///
    /// Fails when the token is rejected, which stops startup.
    pub async fn connect(bot_token: &str, config: &TelegramConfig) -> anyhow::Result<Self> {
        let mut channel = Self {
            bot_token: bot_token.trim().to_string(),
            bot_username: String::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            poll_timeout_secs: config.poll_timeout_secs,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            drop_pending_updates: config.drop_pending_updates,
            client: reqwest::Client::new(),
        };

        let me: User = channel
            .call("getMe", &serde_json::json!({}))
            .await
            .context("failed to create bot")?;
        channel.bot_username = me
            .username
            .context("Telegram getMe returned a bot without a username")?;

        Ok(channel)
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<T> {
        let response: ApiResponse<T> = self
            .client
            .post(self.api_url(method))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Telegram {method} request failed"))?
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Telegram {method} returned malformed JSON"))?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(TelegramApiError {
                method: method.to_string(),
                code: error_code.unwrap_or_default(),
                description: description.unwrap_or_else(|| "no description".to_string()),
            }
            .into()),
        }
    }

    async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    async fn send_message(&self, reply: &OutboundReply, format: ReplyFormat) -> anyhow::Result<()> {
        let mut body = serde_json::json!({
            "chat_id": reply.chat_id.0,
            "text": reply.text,
        });
        if let Some(message_id) = reply.reply_to_message_id {
            body["reply_parameters"] = serde_json::json!({
                "message_id": message_id,
                "allow_sending_without_reply": true,
            });
        }
        if format == ReplyFormat::Markdown {
            body["parse_mode"] = serde_json::json!("Markdown");
        }

        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }
}

/// Telegram answers 400 "can't parse entities" when the markup is malformed.
fn is_entity_parse_error(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<TelegramApiError>()
        .is_some_and(|e| e.code == 400 && e.description.contains("parse entities"))
}

/// Sleep for `delay` unless shutdown is requested first. Returns `true` on shutdown.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        () = shutdown::requested(shutdown) => true,
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn bot_username(&self) -> &str {
        &self.bot_username
    }

    async fn send(&self, reply: &OutboundReply) -> anyhow::Result<()> {
        match self.send_message(reply, reply.format).await {
            // Model output is not always valid Telegram Markdown.
            Err(e) if reply.format == ReplyFormat::Markdown && is_entity_parse_error(&e) => {
                tracing::warn!(chat_id = %reply.chat_id, error = %e, "markdown reply rejected, resending as plain text");
                self.send_message(reply, ReplyFormat::Plain).await
            }
            other => other,
        }
    }

    async fn listen(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        if self.drop_pending_updates {
            let _: bool = self
                .call(
                    "deleteWebhook",
                    &serde_json::json!({ "drop_pending_updates": true }),
                )
                .await?;
        }

        tracing::info!(username = %self.bot_username, "Telegram channel listening for messages...");

        let mut offset: i64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let updates = tokio::select! {
                result = self.get_updates(offset) => result,
                () = shutdown::requested(&mut shutdown) => break,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "Telegram poll error");
                    if wait_or_shutdown(RETRY_DELAY, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);

                let Some(message) = update.message.and_then(into_inbound) else {
                    continue;
                };

                if tx.send(message).await.is_err() {
                    tracing::info!("message receiver dropped, stopping Telegram listener");
                    return Ok(());
                }
            }
        }

        tracing::info!("Telegram channel stopped");
        Ok(())
    }
}
