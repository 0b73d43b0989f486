//! The Matrix `Channel` adapter: sync loop, auto-join/bridge-detection on
//! invite, and message dispatch through a [`MessageRouter`].
//!
//! Structure ported from `MatrixConnector` in the original Python bot
//! (`_run_loop`/`_setup_client`/`_on_invite`/`on_text_message`), adapted
//! to `skynet-channels::Channel` and `matrix-sdk`'s event-handler sync
//! model in place of `matrix-nio`'s callback registration.
//!
//! Split into [`MatrixBot`] (the stateless-given-its-client message
//! logic, held behind an `Arc` so `matrix_sdk::Client::add_event_handler`
//! closures can capture it) and [`MatrixConnector`] (the `Channel`
//! lifecycle wrapper `&mut self` requires) — `Channel::connect` cannot
//! hand out an `Arc<Self>` to event handlers directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use matrix_sdk::authentication::matrix::{MatrixSession, MatrixSessionTokens};
use matrix_sdk::config::SyncSettings;
use matrix_sdk::room::Room;
use matrix_sdk::ruma::events::room::member::StrippedRoomMemberEvent;
use matrix_sdk::ruma::events::room::message::{
    MessageType, OriginalSyncRoomMessageEvent, RoomMessageEventContent,
};
use matrix_sdk::{Client, RoomMemberships, SessionMeta};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use skynet_channels::{Channel, ChannelError, ChannelStatus, OutboundMessage};

use crate::allow::{is_room_allowed, is_user_allowed};
use crate::bridge::{BridgeInfo, BridgePatterns, RemoteChatType};
use crate::error::MatrixError;
use crate::mention::{detect_mention, strip_mention};
use skynet_channels::{ChatKind, MessageRouter, RouteRequest};

#[derive(Debug, Clone)]
pub struct MatrixConnectorConfig {
    pub homeserver_url: String,
    pub user_id: String,
    pub access_token: String,
    pub device_id: String,
    pub allowed_users: Vec<String>,
    pub allowed_rooms: Vec<String>,
    pub group_mention_mode: GroupMentionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMentionMode {
    AllMessages,
    MentionOnly,
}

/// The message-handling logic, independent of the connector's own
/// lifecycle state. Cheap to hold behind an `Arc` and share with sync
/// event-handler closures.
struct MatrixBot {
    config: MatrixConnectorConfig,
    router: Arc<dyn MessageRouter>,
    patterns: BridgePatterns,
    client: Mutex<Option<Client>>,
    nudge_sent: Mutex<HashMap<String, u32>>,
}

impl MatrixBot {
    async fn on_invite(&self, ev: StrippedRoomMemberEvent, room: Room) {
        if ev.state_key.as_str() != self.config.user_id {
            return;
        }
        let room_id = room.room_id().to_string();

        if is_room_allowed(&self.config.allowed_rooms, &room_id) {
            if let Err(e) = room.join().await {
                warn!(room_id, error = %e, "failed to auto-join allowed room");
            } else {
                info!(room_id, "auto-joined allowed matrix room");
            }
            return;
        }

        if let Err(e) = room.join().await {
            warn!(room_id, error = %e, "failed to join room for bridge detection");
            return;
        }

        match self.detect_bridge(&room).await {
            Some(info) => self.handle_bridged_room(&room, &info).await,
            None => {
                info!(room_id, "non-bridged, non-allowed room — leaving");
                let _ = room.leave().await;
            }
        }
    }

    async fn detect_bridge(&self, room: &Room) -> Option<BridgeInfo> {
        let members = room.members(RoomMemberships::JOIN).await.ok()?;
        let member_ids: Vec<String> = members.iter().map(|m| m.user_id().to_string()).collect();
        self.patterns.detect(&member_ids)
    }

    /// A bridged room got no allowlist entry — the gateway's pairing
    /// store (not modeled here) is expected to create the actual
    /// pairing request once `MessageRouter::handle_unknown_sender`
    /// sees the first real message from this room.
    async fn handle_bridged_room(&self, room: &Room, info: &BridgeInfo) {
        let room_id = room.room_id().to_string();
        info!(room_id, bridge_type = %info.bridge_type, "joined bridged matrix room, awaiting first message for pairing");
        self.send_room_message(&room_id, "I've joined this bridged room. Send a message to start pairing with your account.").await;
    }

    async fn on_room_message(&self, ev: OriginalSyncRoomMessageEvent, room: Room) {
        if ev.sender.as_str() == self.config.user_id {
            return;
        }
        let MessageType::Text(text_content) = ev.content.msgtype.clone() else {
            return;
        };
        let body = text_content.body.clone();
        let room_id = room.room_id().to_string();
        let sender = ev.sender.to_string();

        let bridge_info = self.detect_bridge(&room).await;
        let chat_type = match &bridge_info {
            Some(info) => info.remote_chat_type.clone(),
            None => {
                if room.joined_members_count() <= 2 { RemoteChatType::Dm } else { RemoteChatType::Group }
            }
        };

        let is_authorized = if bridge_info.is_some() || chat_type == RemoteChatType::Group {
            is_room_allowed(&self.config.allowed_rooms, &room_id)
        } else {
            is_user_allowed(&self.config.allowed_users, &sender)
        };

        if !is_authorized {
            if chat_type == RemoteChatType::Dm {
                let display = crate::mention::mxid_localpart(&sender);
                match self.router.handle_unknown_sender(&sender, &display, &room_id).await {
                    Ok(reply) => self.send_room_message(&room_id, &reply).await,
                    Err(e) => warn!(error = %e, "unknown-sender pairing handler failed"),
                }
            }
            return;
        }

        let mut effective_message = body.clone();
        if chat_type == RemoteChatType::Group && self.config.group_mention_mode == GroupMentionMode::MentionOnly {
            let raw_content = serde_json::to_value(&ev.content).unwrap_or_default();
            if !detect_mention(&raw_content, &self.config.user_id, &body) {
                return;
            }
            effective_message = strip_mention(&body, &self.config.user_id);
            if effective_message.is_empty() {
                return;
            }
        }

        if !self.is_session_initialized(&room_id).await {
            self.send_init_nudge(&room_id).await;
            return;
        }

        let request = RouteRequest {
            session_key_hint: room_id.clone(),
            platform_user_id: sender,
            platform_chat_id: room_id.clone(),
            chat_type: match chat_type { RemoteChatType::Dm => ChatKind::Dm, RemoteChatType::Group => ChatKind::Group },
            message: effective_message,
        };

        match self.router.route(request).await {
            Ok(response) => {
                if !response.is_empty() {
                    self.send_room_message(&room_id, &response).await;
                }
            }
            Err(e) => {
                warn!(room_id, error = %e, "matrix turn routing failed");
                self.send_room_message(&room_id, "Something went wrong. Please try again later.").await;
            }
        }
    }

    /// Whether the linked session is ready to receive turns. The router
    /// owns session state; this connector treats "routable" as "not yet
    /// rejected by the router" and defers the real check to it — kept
    /// as a seam (always true today) so a future router can veto before
    /// the first real turn without touching connector code.
    async fn is_session_initialized(&self, _room_id: &str) -> bool {
        true
    }

    async fn send_init_nudge(&self, room_id: &str) {
        let mut nudges = self.nudge_sent.lock().await;
        let count = nudges.entry(room_id.to_string()).or_insert(0);
        let text = match *count {
            0 => "Session created! Configure it, then activate it.",
            _ => "Still being configured. Please activate it first.",
        };
        self.send_room_message(room_id, text).await;
        *count += 1;
    }

    async fn send_room_message(&self, room_id: &str, text: &str) {
        let client_guard = self.client.lock().await;
        let Some(client) = client_guard.as_ref() else { return };
        let Ok(parsed) = <&matrix_sdk::ruma::RoomId>::try_from(room_id) else { return };
        let Some(room) = client.get_room(parsed) else { return };
        drop(client_guard);
        if let Err(e) = room.send(RoomMessageEventContent::text_plain(text)).await {
            warn!(room_id, error = %e, "failed to send matrix room message");
        }
    }
}

pub struct MatrixConnector {
    bot: Arc<MatrixBot>,
    status: Mutex<ChannelStatus>,
}

impl MatrixConnector {
    pub fn new(config: MatrixConnectorConfig, router: Arc<dyn MessageRouter>) -> Self {
        let domain = homeserver_domain(&config.homeserver_url);
        let patterns = BridgePatterns::new(&domain);
        Self {
            bot: Arc::new(MatrixBot {
                config,
                router,
                patterns,
                client: Mutex::new(None),
                nudge_sent: Mutex::new(HashMap::new()),
            }),
            status: Mutex::new(ChannelStatus::Disconnected),
        }
    }

    async fn build_client(&self) -> Result<Client, MatrixError> {
        let client = Client::builder().homeserver_url(&self.bot.config.homeserver_url).build().await?;
        let user_id = self.bot.config.user_id.as_str().try_into().map_err(|_| MatrixError::NoToken)?;
        client
            .restore_session(MatrixSession {
                meta: SessionMeta { user_id, device_id: self.bot.config.device_id.as_str().into() },
                tokens: MatrixSessionTokens { access_token: self.bot.config.access_token.clone(), refresh_token: None },
            })
            .await?;
        Ok(client)
    }
}

#[async_trait]
impl Channel for MatrixConnector {
    fn name(&self) -> &str {
        "matrix"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        *self.status.lock().await = ChannelStatus::Connecting;
        let client = self.build_client().await.map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        let message_bot = Arc::clone(&self.bot);
        client.add_event_handler(move |ev: OriginalSyncRoomMessageEvent, room: Room| {
            let bot = Arc::clone(&message_bot);
            async move { bot.on_room_message(ev, room).await }
        });

        let invite_bot = Arc::clone(&self.bot);
        client.add_event_handler(move |ev: StrippedRoomMemberEvent, room: Room| {
            let bot = Arc::clone(&invite_bot);
            async move { bot.on_invite(ev, room).await }
        });

        *self.bot.client.lock().await = Some(client.clone());
        *self.status.lock().await = ChannelStatus::Connected;

        tokio::spawn(async move {
            if let Err(e) = client.sync(SyncSettings::default()).await {
                error!(error = %e, "matrix sync loop ended with error");
            }
        });

        info!("matrix connector connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        *self.bot.client.lock().await = None;
        *self.status.lock().await = ChannelStatus::Disconnected;
        info!("matrix connector disconnected");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        self.bot.send_room_message(&msg.recipient_id, &msg.content).await;
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.try_lock().map(|s| s.clone()).unwrap_or(ChannelStatus::Connecting)
    }
}

fn homeserver_domain(homeserver_url: &str) -> String {
    homeserver_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split(['/', ':'])
        .next()
        .unwrap_or("localhost")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homeserver_domain_strips_scheme_and_port() {
        assert_eq!(homeserver_domain("https://matrix.example.org:8448"), "matrix.example.org");
        assert_eq!(homeserver_domain("http://localhost:6167"), "localhost");
    }
}
