use anyhow::{Context, Result};
use std::sync::Arc;

use super::commands::{parse_command, SetRoleCommand, StartCommand};
use super::filter;
use super::traits::{CommandContext, SlashCommandHandler};
use crate::channels::{ChatKind, InboundMessage, OutboundReply, ReplyFormat};
use crate::sessions::{PendingActionStore, SessionStore};

pub const ROLE_SET_CONFIRMATION: &str = "Роль установлена!";

/// Routes inbound chat messages to commands, persona assignment or the
/// chat's conversation.
pub struct MessageRouter {
    sessions: Arc<dyn SessionStore>,
    pending: Arc<dyn PendingActionStore>,
    commands: Vec<Box<dyn SlashCommandHandler>>,
    bot_username: String,
}

impl MessageRouter {
    /// Router with the built-in `/start` and `/setrole` commands.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        pending: Arc<dyn PendingActionStore>,
        bot_username: impl Into<String>,
    ) -> Self {
        let commands: Vec<Box<dyn SlashCommandHandler>> = vec![
            Box::new(StartCommand::new(sessions.clone())),
            Box::new(SetRoleCommand::new(sessions.clone(), pending.clone())),
        ];
        Self::with_commands(sessions, pending, bot_username, commands)
    }

    pub fn with_commands(
        sessions: Arc<dyn SessionStore>,
        pending: Arc<dyn PendingActionStore>,
        bot_username: impl Into<String>,
        commands: Vec<Box<dyn SlashCommandHandler>>,
    ) -> Self {
        Self {
            sessions,
            pending,
            commands,
            bot_username: bot_username.into(),
        }
    }

    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    pub fn commands(&self) -> impl Iterator<Item = &dyn SlashCommandHandler> {
        self.commands.iter().map(|c| c.as_ref())
    }

    fn find_command(&self, name: &str) -> Option<&dyn SlashCommandHandler> {
        self.commands()
            .find(|handler| handler.command().eq_ignore_ascii_case(name))
    }

    /// Handle one inbound message.
    ///
    /// `Ok(None)` means the message was filtered out or needs no answer. Errors
    /// carry the failing step as context; the caller logs them and sends nothing.
    pub async fn handle(&self, message: &InboundMessage) -> Result<Option<OutboundReply>> {
        if let Some(parsed) = parse_command(&message.text, &self.bot_username) {
            if let Some(handler) = self.find_command(parsed.name) {
                tracing::debug!(chat_id = %message.chat_id, command = handler.command(), "running command");
                let context = CommandContext {
                    chat_id: message.chat_id,
                    chat_kind: message.chat_kind,
                };
                let result = handler.execute(parsed.args, &context).await?;
                return Ok(Some(OutboundReply::to(message, result.output)));
            }
        }

        let waiting = self.pending.is_waiting_for_role(message.chat_id).await?;
        let admission = filter::admit(message, waiting, &self.bot_username);
        if !admission.is_admitted() {
            tracing::trace!(chat_id = %message.chat_id, "message not addressed to the bot");
            return Ok(None);
        }
        tracing::debug!(chat_id = %message.chat_id, %admission, "message admitted");

        self.dispatch(message).await
    }

    async fn dispatch(&self, message: &InboundMessage) -> Result<Option<OutboundReply>> {
        let chat_id = message.chat_id;
        let conversation = self
            .sessions
            .get_or_create(chat_id)
            .await
            .context("failed to resolve chat session")?;

        // Check-and-clear so two racing messages cannot both become the persona.
        if self.pending.take_waiting_for_role(chat_id).await? {
            conversation.assign_persona(&message.text).await?;
            tracing::info!(%chat_id, "persona assigned");
            return Ok(Some(OutboundReply::to(message, ROLE_SET_CONFIRMATION)));
        }

        match message.chat_kind {
            ChatKind::Private => {
                let answer = conversation.respond(&message.text).await?;
                Ok(Some(
                    OutboundReply::to(message, answer).with_format(ReplyFormat::Markdown),
                ))
            }
            kind if kind.is_group() => {
                let Some(replied) = message
                    .reply_to
                    .as_ref()
                    .filter(|replied| !replied.text.trim().is_empty())
                else {
                    tracing::debug!(%chat_id, "replied-to message has no text, skipping");
                    return Ok(None);
                };
                let answer = conversation.respond(&replied.text).await?;
                Ok(Some(OutboundReply::to(message, answer)))
            }
            _ => Ok(None),
        }
    }
}
