//! Admission filter: decides whether a non-command message is processed at all.

use super::traits::Admission;
use crate::channels::{ChatKind, InboundMessage};

const MENTION_ENTITY: &str = "mention";

/// Whether `message` carries a mention entity equal to `@bot_username`.
pub fn mentions_bot(message: &InboundMessage, bot_username: &str) -> bool {
    let handle = format!("@{bot_username}");
    message
        .entities
        .iter()
        .filter(|entity| entity.kind == MENTION_ENTITY)
        .any(|entity| message.entity_text(entity).as_deref() == Some(handle.as_str()))
}

/// Apply the admission rules in priority order: pending persona, private
/// chat, then group replies that mention the bot.
pub fn admit(message: &InboundMessage, waiting_for_role: bool, bot_username: &str) -> Admission {
    if waiting_for_role {
        return Admission::Pending;
    }

    if message.chat_kind == ChatKind::Private {
        return Admission::Private;
    }

    if message.chat_kind.is_group()
        && message.reply_to.is_some()
        && mentions_bot(message, bot_username)
    {
        return Admission::Mentioned;
    }

    Admission::Rejected
}
