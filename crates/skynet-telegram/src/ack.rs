//! Instant visual acknowledgment — an emoji reaction sent before the
//! per-chat lock is acquired, removed once the response is delivered
//! (spec §4.7).

use teloxide::prelude::*;
use teloxide::types::ReactionType;
use tracing::warn;

pub async fn set(bot: &Bot, chat_id: ChatId, message_id: MessageId, emoji: &str) {
    if emoji.is_empty() {
        return;
    }
    if let Err(e) = bot
        .set_message_reaction(chat_id, message_id)
        .reaction(vec![ReactionType::Emoji { emoji: emoji.to_string() }])
        .await
    {
        warn!(error = %e, "Telegram: failed to set ack reaction");
    }
}

pub async fn clear(bot: &Bot, chat_id: ChatId, message_id: MessageId) {
    if let Err(e) = bot.set_message_reaction(chat_id, message_id).await {
        warn!(error = %e, "Telegram: failed to clear ack reaction");
    }
}
