//! Messaging platform transports.

pub mod telegram;
pub mod traits;

pub use telegram::TelegramChannel;
pub use traits::{
    Channel, ChatKind, InboundMessage, MessageEntity, OutboundReply, RepliedMessage, ReplyFormat,
};

use anyhow::Context;
use std::sync::Arc;

use crate::config::Config;

/// Connect the Telegram channel described by `config`.
pub async fn create_channel(config: &Config) -> anyhow::Result<Arc<dyn Channel>> {
    let token = config
        .telegram
        .bot_token
        .as_deref()
        .context("Telegram bot token is not set")?;
    let channel = TelegramChannel::connect(token, &config.telegram).await?;
    tracing::info!(
        username = %channel.bot_username(),
        token = %crate::security::redact(token),
        "Telegram bot connected"
    );
    Ok(Arc::new(channel))
}
