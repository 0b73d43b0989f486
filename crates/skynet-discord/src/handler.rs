//! Serenity event handler wired to a [`skynet_channels::MessageRouter`].
//!
//! Mirrors `MatrixBot::on_room_message` in `skynet-matrix`: allowlist,
//! mention gating, pairing flow for unknown senders, then routing
//! through the router instead of talking to the agent runtime directly.

use std::sync::{Arc, OnceLock};

use serenity::all::ActivityData;
use serenity::async_trait;
use serenity::builder::CreateThread;
use serenity::model::channel::{ChannelType, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::model::user::OnlineStatus;
use serenity::prelude::{Context, EventHandler};
use tracing::{info, warn};

use skynet_channels::{ChatKind, GroupHistoryEntry, RouteRequest};
use skynet_core::config::DiscordConfig;

use crate::ack::AckHandle;
use crate::send;
use crate::state::DiscordState;

pub struct DiscordHandler {
    pub state: Arc<DiscordState>,
    pub bot_id: OnceLock<UserId>,
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();

        let status = parse_online_status(&self.state.config.status);
        let activity = build_activity(&self.state.config);
        ctx.set_presence(activity, status);

        info!(name = %ready.user.name, "Discord bot connected");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let is_guild = msg.guild_id.is_some();
        let username = msg.author.name.clone();
        let user_id = msg.author.id.to_string();
        let chat_key = msg.channel_id.to_string();

        if is_guild && !msg.content.is_empty() {
            self.state.runtime.group_history.record(
                &chat_key,
                GroupHistoryEntry {
                    user_display: username.clone(),
                    text: msg.content.clone(),
                    timestamp: msg.timestamp.to_string(),
                    message_id: msg.id.to_string(),
                },
            );
        }

        if !is_guild && !self.state.config.dm_allowed {
            return;
        }

        let allowed = crate::allow::is_allowed(&self.state.config.allow_users, &username, &user_id);
        if !allowed {
            if !is_guild {
                let reply = self
                    .state
                    .runtime
                    .router
                    .handle_unknown_sender(&user_id, &username, &chat_key)
                    .await;
                match reply {
                    Ok(text) => {
                        let _ = send::send_chunked(&ctx.http, msg.channel_id, &text).await;
                    }
                    Err(e) => warn!(error = %e, "Discord: unknown-sender pairing handler failed"),
                }
            }
            return;
        }

        if is_guild && self.state.config.require_mention {
            let Some(bot_id) = self.bot_id.get() else {
                return;
            };
            if !msg.mentions_user_id(*bot_id) {
                return;
            }
        }

        let content = strip_mention(&msg.content).trim().to_string();

        if content.is_empty() && msg.attachments.is_empty() {
            return;
        }

        let (session_key, target_channel) = resolve_session(&ctx, &msg, self.state.config.auto_thread).await;

        if !self.state.runtime.router.is_initialized(&session_key).await {
            if let Some(nudge) = self.state.runtime.next_nudge(&chat_key) {
                let _ = send::send_chunked(&ctx.http, target_channel, nudge).await;
            }
            return;
        }

        let _ = target_channel.broadcast_typing(&ctx.http).await;

        let mut ack = if self.state.config.ack_reactions {
            AckHandle::new(Arc::clone(&ctx.http), msg.channel_id, msg.id)
        } else {
            AckHandle::disabled()
        };
        ack.thinking().await;

        let state = Arc::clone(&self.state);
        let http = Arc::clone(&ctx.http);
        let reply_to = msg.id;
        let attachments = msg.attachments.clone();
        let lock = state.runtime.chat_lock(&chat_key);

        tokio::spawn(async move {
            let _guard = lock.lock().await;
            process_message(state, http, target_channel, reply_to, session_key, user_id, chat_key, content, attachments, ack).await;
        });
    }
}

/// Remove an @mention prefix (e.g. `<@123456789>`) from a message.
fn strip_mention(s: &str) -> &str {
    let trimmed = s.trim_start();
    if trimmed.starts_with("<@") {
        if let Some(end) = trimmed.find('>') {
            return trimmed[end + 1..].trim_start();
        }
    }
    trimmed
}

/// Resolve the session key and target channel for a message.
///
/// - Thread: `discord:thread:{thread_id}`
/// - Guild:  `discord:guild:{guild_id}`
/// - DM:     `discord:dm:{author_id}`
async fn resolve_session(ctx: &Context, msg: &Message, auto_thread: bool) -> (String, serenity::model::id::ChannelId) {
    let is_thread = msg
        .guild_id
        .and_then(|gid| ctx.cache.guild(gid))
        .and_then(|guild| guild.channels.get(&msg.channel_id).cloned())
        .map(|ch| matches!(ch.kind, ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread))
        .unwrap_or(false);

    if is_thread {
        return (format!("discord:thread:{}", msg.channel_id), msg.channel_id);
    }

    if auto_thread && msg.guild_id.is_some() {
        let thread_name: String = msg.content.chars().take(50).collect();
        let thread_name = if thread_name.is_empty() { "AI Conversation".to_string() } else { thread_name };

        match msg
            .channel_id
            .create_thread_from_message(&ctx.http, msg.id, CreateThread::new(thread_name).kind(ChannelType::PublicThread))
            .await
        {
            Ok(thread) => return (format!("discord:thread:{}", thread.id), thread.id),
            Err(e) => warn!(error = %e, "failed to create auto-thread, falling back to channel"),
        }
    }

    let key = match msg.guild_id {
        Some(gid) => format!("discord:guild:{gid}"),
        None => format!("discord:dm:{}", msg.author.id),
    };
    (key, msg.channel_id)
}

#[allow(clippy::too_many_arguments)]
async fn process_message(
    state: Arc<DiscordState>,
    http: Arc<serenity::http::Http>,
    channel_id: serenity::model::id::ChannelId,
    reply_to: serenity::model::id::MessageId,
    session_key: String,
    user_id: String,
    chat_key: String,
    content: String,
    attachments: Vec<serenity::model::channel::Attachment>,
    mut ack: AckHandle,
) {
    let resolved_text = match crate::voice::resolve_text(&content, &attachments, state.runtime.transcriber.as_ref()).await {
        Ok(text) => text,
        Err(e) => {
            ack.done_err().await;
            let _ = send::send_chunked(&http, channel_id, &e).await;
            return;
        }
    };

    let non_voice: Vec<_> = attachments
        .iter()
        .filter(|a| !matches!(crate::attach::classify(a), crate::attach::AttachmentKind::Voice))
        .cloned()
        .collect();
    let saved_paths = if non_voice.is_empty() {
        Vec::new()
    } else {
        crate::attach::save_all(&state.vault_root, &non_voice, state.config.max_attachment_bytes).await
    };

    let mut message = resolved_text;
    for path in &saved_paths {
        message.push_str(&format!("\n\n[attachment: {path}]"));
    }
    if message.trim().is_empty() {
        message = "[User sent attachment(s)]".to_string();
    }

    let is_dm = !channel_id_is_guild(&session_key);
    let request = RouteRequest {
        session_key_hint: session_key.clone(),
        platform_user_id: user_id,
        platform_chat_id: chat_key,
        chat_type: if is_dm { ChatKind::Dm } else { ChatKind::Group },
        message,
    };

    let response = match state.runtime.router.route(request).await {
        Ok(r) => {
            ack.done_ok().await;
            r
        }
        Err(e) => {
            ack.done_err().await;
            warn!(error = %e, session = %session_key, "Discord: turn routing failed");
            let _ = channel_id.say(&http, "\u{26a0}\u{fe0f} AI unavailable. Please try again later.").await;
            return;
        }
    };

    let send_result = if let Some((embed, remaining)) = crate::embed::try_parse_embed(&response) {
        let create_embed = embed.to_create_embed();
        let msg = serenity::builder::CreateMessage::new().embed(create_embed);
        let embed_result = channel_id.send_message(&http, msg).await;
        if !remaining.is_empty() {
            if let Err(e) = send::send_response(&http, channel_id, &remaining, Some(reply_to)).await {
                warn!(error = %e, session = %session_key, "Discord: send remaining text failed");
            }
        }
        embed_result.map(|_| ())
    } else {
        send::send_response(&http, channel_id, &response, Some(reply_to)).await
    };

    if let Err(e) = send_result {
        warn!(error = %e, session = %session_key, "Discord: send failed");
    }
}

fn channel_id_is_guild(session_key: &str) -> bool {
    session_key.starts_with("discord:guild:") || session_key.starts_with("discord:thread:")
}

fn parse_online_status(s: &str) -> OnlineStatus {
    match s.to_lowercase().as_str() {
        "idle" => OnlineStatus::Idle,
        "dnd" | "do_not_disturb" => OnlineStatus::DoNotDisturb,
        "invisible" => OnlineStatus::Invisible,
        _ => OnlineStatus::Online,
    }
}

fn build_activity(config: &DiscordConfig) -> Option<ActivityData> {
    let name = config.activity_name.as_deref()?;
    let kind = config.activity_type.as_deref().unwrap_or("playing");
    Some(match kind.to_lowercase().as_str() {
        "listening" => ActivityData::listening(name),
        "watching" => ActivityData::watching(name),
        "competing" => ActivityData::competing(name),
        "custom" => ActivityData::custom(name),
        _ => ActivityData::playing(name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_mention_removes_prefix() {
        assert_eq!(strip_mention("<@123456789> hello"), "hello");
        assert_eq!(strip_mention("hello"), "hello");
    }

    #[test]
    fn channel_id_is_guild_detects_thread_and_guild() {
        assert!(channel_id_is_guild("discord:guild:42"));
        assert!(channel_id_is_guild("discord:thread:7"));
        assert!(!channel_id_is_guild("discord:dm:1"));
    }
}
