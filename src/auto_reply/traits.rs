use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channels::ChatKind;
use crate::sessions::ChatId;

/// Outcome of the admission filter for a non-command message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Admission {
    /// The chat is waiting for persona text.
    Pending,
    /// One-to-one dialog with the bot.
    Private,
    /// Group reply that mentions the bot.
    Mentioned,
    Rejected,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl std::fmt::Display for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Mentioned => "mentioned",
            Self::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct CommandContext {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
}

/// A bot command such as `/start`. Commands bypass the admission filter.
#[async_trait]
pub trait SlashCommandHandler: Send + Sync {
    /// Command name without the leading slash.
    fn command(&self) -> &str;
    async fn execute(&self, args: &str, context: &CommandContext) -> Result<CommandResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rejected_is_not_admitted() {
        assert!(Admission::Pending.is_admitted());
        assert!(Admission::Private.is_admitted());
        assert!(Admission::Mentioned.is_admitted());
        assert!(!Admission::Rejected.is_admitted());
    }

    #[test]
    fn admission_serializes_by_variant_name() {
        let json = serde_json::to_string(&Admission::Mentioned).unwrap();
        assert!(json.contains("Mentioned"));
        assert_eq!(Admission::Mentioned.to_string(), "mentioned");
    }
}
