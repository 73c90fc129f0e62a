use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::BotCommand;

use crate::dispatch::Dispatcher;
use crate::messages;

use super::bot::TelegramSink;

/// Entry point: start the Telegram bot with long polling.
pub async fn run_bot(token: &str, dispatcher: Arc<Dispatcher>) {
    let bot = Bot::new(token);

    // Register bot commands for autocomplete
    let commands: Vec<BotCommand> = dispatcher
        .command_names()
        .into_iter()
        .map(|name| BotCommand::new(name, messages::command_description(name)))
        .collect();
    if let Err(e) = bot.set_my_commands(commands).await {
        tracing::warn!(error = %e, "failed to set bot commands");
    }

    tracing::info!("bot connected, listening for messages");
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let dispatcher = dispatcher.clone();
        async move {
            handle_message(bot, msg, &dispatcher).await;
            respond(())
        }
    })
    .await;
}

/// Route one incoming message to the dispatcher.
async fn handle_message(bot: Bot, msg: Message, dispatcher: &Dispatcher) {
    // No user info (e.g. channel post)
    let Some(uid) = msg.from.as_ref().map(|u| u.id.0) else {
        return;
    };
    let Some(text) = msg.text() else {
        return;
    };
    let Some(command) = parse_command(text) else {
        return;
    };

    let user_name = msg
        .from
        .as_ref()
        .map(|u| u.first_name.as_str())
        .unwrap_or("unknown");
    tracing::info!(user = user_name, user_id = uid, command, "received command");

    let sink = TelegramSink::new(bot, msg.chat.id);
    dispatcher.dispatch(command, uid, &sink).await;
}

/// Extract the command name from `/cmd`, `/cmd args` or `/cmd@botname args`.
/// Returns `None` for text that is not a command.
pub(super) fn parse_command(text: &str) -> Option<&str> {
    let first = text.trim_start().split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_command() {
        assert_eq!(parse_command("/status"), Some("status"));
    }

    #[test]
    fn test_parse_strips_bot_name_and_args() {
        assert_eq!(parse_command("/status@opsbot extra args"), Some("status"));
        assert_eq!(parse_command("/backup@opsbot"), Some("backup"));
        assert_eq!(parse_command("  /deploy now"), Some("deploy"));
    }

    #[test]
    fn test_parse_ignores_non_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("status /start"), None);
    }

    #[test]
    fn test_parse_bare_slash() {
        assert_eq!(parse_command("/"), Some(""));
    }
}
