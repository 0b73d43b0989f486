//! The gateway's concrete [`MessageRouter`]: the only bridge between a
//! connector's platform-specific event loop and
//! `skynet_orchestrator::Orchestrator::run_turn`.
//!
//! One instance is constructed per connector (Telegram, Discord, Matrix),
//! each tagged with its own `platform` string so unknown-sender pairing
//! requests dedupe per `(platform, platform_user_id)` as spec §4.7
//! requires.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{pin_mut, StreamExt};

use skynet_channels::{MessageRouter, PairingRequest, PairingStatus, RouteRequest};
use skynet_orchestrator::{CapabilityBundle, Orchestrator, TurnEvent, TurnInput};
use skynet_sessions::SessionSource;

/// Every linked-by-platform-identity session runs as its own Skynet
/// user with a single `"main"` agent slot — `skynet-users`' cross-
/// platform identity linking was out of scope (see DESIGN.md) and its
/// removal means a platform-native session key (`telegram:dm:42`, …) is
/// itself the most stable identity a connector turn has.
const DEFAULT_AGENT_ID: &str = "main";
const DEFAULT_SESSION_NAME: &str = "main";

pub struct PairingStore {
    requests: DashMap<String, PairingRequest>,
}

impl PairingStore {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
        }
    }

    /// Open (or return the existing) pending pairing request for this
    /// sender, deduped per `(platform, platform_user_id)` (property P13).
    pub fn open(
        &self,
        platform: &str,
        platform_user_id: &str,
        platform_user_display: &str,
        platform_chat_id: &str,
    ) -> PairingRequest {
        let key = PairingRequest::dedup_key(platform, platform_user_id);
        self.requests
            .entry(key)
            .or_insert_with(|| {
                PairingRequest::new(platform, platform_user_id, platform_user_display, platform_chat_id)
            })
            .clone()
    }

    pub fn list(&self) -> Vec<PairingRequest> {
        let mut out: Vec<_> = self.requests.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    pub fn get_by_id(&self, id: &str) -> Option<PairingRequest> {
        self.requests.iter().find(|e| e.value().id == id).map(|e| e.value().clone())
    }

    pub fn set_status(&self, id: &str, status: PairingStatus) -> Option<PairingRequest> {
        let mut found = None;
        for mut entry in self.requests.iter_mut() {
            if entry.value().id == id {
                entry.value_mut().status = status;
                found = Some(entry.value().clone());
                break;
            }
        }
        found
    }
}

impl Default for PairingStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GatewayMessageRouter {
    orchestrator: Arc<Orchestrator>,
    capabilities: CapabilityBundle,
    pairing: Arc<PairingStore>,
    platform: String,
    model: String,
    timeout_seconds: u64,
}

impl GatewayMessageRouter {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        capabilities: CapabilityBundle,
        pairing: Arc<PairingStore>,
        platform: &str,
    ) -> Self {
        Self {
            orchestrator,
            capabilities,
            pairing,
            platform: platform.to_string(),
            model: "claude-sonnet-4-6".to_string(),
            timeout_seconds: 300,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

#[async_trait]
impl MessageRouter for GatewayMessageRouter {
    async fn route(&self, request: RouteRequest) -> Result<String, String> {
        let input = TurnInput {
            user_id: request.session_key_hint.clone(),
            agent_id: DEFAULT_AGENT_ID.to_string(),
            session_name: DEFAULT_SESSION_NAME.to_string(),
            message: request.message,
            client_trust: None,
            workspace_slug: None,
            working_directory_override: None,
            agent_type: "general".to_string(),
            source: SessionSource::ClaudeCodeSdk,
            model: self.model.clone(),
            timeout_seconds: self.timeout_seconds,
        };

        let stream = self.orchestrator.run_turn(input, self.capabilities.clone());
        pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event {
                TurnEvent::Done { response, .. } => return Ok(response),
                TurnEvent::Aborted { partial_response, .. } => {
                    return Ok(partial_response.unwrap_or_else(|| "Turn aborted.".to_string()));
                }
                TurnEvent::Error { message } => return Err(message),
                TurnEvent::TypedError { code, message } => return Err(format!("{code}: {message}")),
                TurnEvent::SessionUnavailable { reason } => return Err(reason),
                TurnEvent::UserQuestion { .. } => {
                    return Ok(
                        "I need more information to continue — please use the app to answer, then send your message again.".to_string(),
                    );
                }
                _ => {}
            }
        }
        Err("turn ended without a terminal event".to_string())
    }

    async fn handle_unknown_sender(
        &self,
        platform_user_id: &str,
        platform_user_display: &str,
        platform_chat_id: &str,
    ) -> Result<String, String> {
        let request = self.pairing.open(&self.platform, platform_user_id, platform_user_display, platform_chat_id);
        tracing::info!(
            platform = %self.platform,
            pairing_id = %request.id,
            sender = %platform_user_display,
            "opened pairing request for unknown sender"
        );
        Ok("Thanks for reaching out — I've sent a request to the operator. You'll hear back once it's approved.".to_string())
    }

    // `is_initialized` keeps the trait default (always `true`): a sender
    // that reaches `route` has already cleared the connector's allow-list
    // gate, and approving a pairing request (see `router::PairingStore`)
    // is exactly what adds them to that list — there's no separate
    // "linked but not yet configured" state to nudge about.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_store_dedupes_by_platform_and_user() {
        let store = PairingStore::new();
        let a = store.open("telegram", "1", "alice", "1");
        let b = store.open("telegram", "1", "alice-again", "1");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn pairing_store_keeps_distinct_platforms_separate() {
        let store = PairingStore::new();
        let a = store.open("telegram", "1", "alice", "1");
        let b = store.open("discord", "1", "alice", "1");
        assert_ne!(a.id, b.id);
    }
}
