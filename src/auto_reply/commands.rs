use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::traits::{CommandContext, CommandResult, SlashCommandHandler};
use crate::sessions::{PendingActionStore, SessionStore};

pub const START_GREETING: &str =
    "Привет! Я бот, который будет тем кем тебе захочется. Используй /setrole для задания роли.";
pub const SET_ROLE_PROMPT: &str = "Напишите кем мне быть";

/// A `/name args` command addressed to this bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub name: &'a str,
    pub args: &'a str,
}

/// Parse a leading bot command. `/name@other_bot` targets another bot and
/// yields `None`.
pub fn parse_command<'a>(text: &'a str, bot_username: &str) -> Option<ParsedCommand<'a>> {
    let rest = text.strip_prefix('/')?;
    let (token, args) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim()),
        None => (rest, ""),
    };

    let name = match token.split_once('@') {
        Some((name, target)) if target.eq_ignore_ascii_case(bot_username) => name,
        Some(_) => return None,
        None => token,
    };

    if name.is_empty() {
        return None;
    }

    Some(ParsedCommand { name, args })
}

/// `/start`: greets the user and makes sure the chat has a session.
pub struct StartCommand {
    sessions: Arc<dyn SessionStore>,
}

impl StartCommand {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl SlashCommandHandler for StartCommand {
    fn command(&self) -> &str {
        "start"
    }

    async fn execute(&self, _args: &str, context: &CommandContext) -> Result<CommandResult> {
        self.sessions.get_or_create(context.chat_id).await?;
        Ok(CommandResult {
            output: START_GREETING.to_string(),
        })
    }
}

/// `/setrole`: the chat's next accepted message becomes the persona.
pub struct SetRoleCommand {
    sessions: Arc<dyn SessionStore>,
    pending: Arc<dyn PendingActionStore>,
}

impl SetRoleCommand {
    pub fn new(sessions: Arc<dyn SessionStore>, pending: Arc<dyn PendingActionStore>) -> Self {
        Self { sessions, pending }
    }
}

#[async_trait]
impl SlashCommandHandler for SetRoleCommand {
    fn command(&self) -> &str {
        "setrole"
    }

    async fn execute(&self, _args: &str, context: &CommandContext) -> Result<CommandResult> {
        self.sessions.get_or_create(context.chat_id).await?;
        self.pending
            .set_waiting_for_role(context.chat_id, true)
            .await?;
        tracing::debug!(chat_id = %context.chat_id, "waiting for persona text");
        Ok(CommandResult {
            output: SET_ROLE_PROMPT.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChatKind;
    use crate::sessions::conversation::tests::ScriptedProvider;
    use crate::sessions::{
        ChatId, InMemoryPendingActionStore, InMemorySessionStore,
    };

    const BOT: &str = "persona_bot";

    fn context() -> CommandContext {
        CommandContext {
            chat_id: ChatId(77),
            chat_kind: ChatKind::Private,
        }
    }

    #[test]
    fn parse_plain_command() {
        assert_eq!(
            parse_command("/start", BOT),
            Some(ParsedCommand {
                name: "start",
                args: ""
            })
        );
    }

    #[test]
    fn parse_command_with_args() {
        let parsed = parse_command("/setrole  helpful pirate ", BOT).unwrap();
        assert_eq!(parsed.name, "setrole");
        assert_eq!(parsed.args, "helpful pirate");
    }

    #[test]
    fn parse_command_addressed_to_this_bot() {
        let parsed = parse_command("/setrole@Persona_Bot", BOT).unwrap();
        assert_eq!(parsed.name, "setrole");
    }

    #[test]
    fn command_for_another_bot_is_ignored() {
        assert!(parse_command("/setrole@other_bot", BOT).is_none());
    }

    #[test]
    fn non_commands_are_not_parsed() {
        assert!(parse_command("hello /start", BOT).is_none());
        assert!(parse_command("/", BOT).is_none());
        assert!(parse_command("/ start", BOT).is_none());
        assert!(parse_command("/@persona_bot", BOT).is_none());
    }

    #[tokio::test]
    async fn start_creates_session_and_greets() {
        let sessions = Arc::new(InMemorySessionStore::new(ScriptedProvider::answering("ok")));
        let cmd = StartCommand::new(sessions.clone());

        let result = cmd.execute("", &context()).await.unwrap();
        assert_eq!(result.output, START_GREETING);
        assert!(sessions.get(ChatId(77)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn setrole_sets_pending_flag() {
        let sessions = Arc::new(InMemorySessionStore::new(ScriptedProvider::answering("ok")));
        let pending = Arc::new(InMemoryPendingActionStore::new());
        let cmd = SetRoleCommand::new(sessions.clone(), pending.clone());

        let result = cmd.execute("", &context()).await.unwrap();
        assert_eq!(result.output, SET_ROLE_PROMPT);
        assert!(pending.is_waiting_for_role(ChatId(77)).await.unwrap());
        assert!(sessions.get(ChatId(77)).await.unwrap().is_some());
    }

    #[test]
    fn command_metadata() {
        let sessions: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(ScriptedProvider::answering("ok")));
        let start = StartCommand::new(sessions.clone());
        let setrole = SetRoleCommand::new(sessions, Arc::new(InMemoryPendingActionStore::new()));
        assert_eq!(start.command(), "start");
        assert_eq!(setrole.command(), "setrole");
    }
}
