//! Inbound message routing: bot commands, the admission filter and dispatch
//! into per-chat conversations.

pub mod commands;
pub mod filter;
pub mod router;
pub mod traits;

pub use commands::{parse_command, ParsedCommand, SetRoleCommand, StartCommand};
pub use filter::admit;
pub use router::MessageRouter;
pub use traits::{Admission, CommandContext, CommandResult, SlashCommandHandler};

use std::sync::Arc;

use crate::sessions::{PendingActionStore, SessionStore};

pub fn create_router(
    sessions: Arc<dyn SessionStore>,
    pending: Arc<dyn PendingActionStore>,
    bot_username: &str,
) -> Arc<MessageRouter> {
    Arc::new(MessageRouter::new(sessions, pending, bot_username))
}
