use async_trait::async_trait;
use teloxide::prelude::*;

use crate::dispatch::ResponseSink;

/// Telegram message length limit
pub(super) const TELEGRAM_MSG_LIMIT: usize = 4096;

/// Replies into the chat the command came from.
pub(super) struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramSink {
    pub(super) fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl ResponseSink for TelegramSink {
    async fn send(&self, text: &str) {
        let text = truncate_str(text, TELEGRAM_MSG_LIMIT);
        if let Err(e) = self.bot.send_message(self.chat_id, text).await {
            tracing::warn!(chat_id = self.chat_id.0, error = %e, "failed to send reply");
        }
    }
}

/// Cut `s` to at most `max_bytes` on a UTF-8 char boundary.
pub(super) fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
