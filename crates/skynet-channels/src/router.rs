//! The connector's only view of the rest of the system: routing a
//! resolved message to an orchestrator turn and handling the
//! unknown-sender pairing flow (spec §4.7).
//!
//! Every connector (Telegram, Discord, Matrix) depends on this trait
//! instead of `skynet-orchestrator` directly. The gateway wires a
//! concrete implementation backed by `Orchestrator::run_turn` and a
//! pairing-request store; each connector crate stays unit-testable
//! without either.

use async_trait::async_trait;

/// One inbound message ready to be turned into an agent turn.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Hint used to build the session key (chat id, room id, …).
    pub session_key_hint: String,
    pub platform_user_id: String,
    pub platform_chat_id: String,
    pub chat_type: ChatKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Dm,
    Group,
}

#[async_trait]
pub trait MessageRouter: Send + Sync {
    /// Run one turn and return the final assistant text to display.
    async fn route(&self, request: RouteRequest) -> Result<String, String>;

    /// A message arrived from a sender with no linked session and no
    /// entry in the allowlist. Returns the text to show the sender
    /// (e.g. "request sent, waiting for approval").
    async fn handle_unknown_sender(
        &self,
        platform_user_id: &str,
        platform_user_display: &str,
        platform_chat_id: &str,
    ) -> Result<String, String>;

    /// Whether the linked session has been configured/activated in the
    /// app yet (spec §4.7: respond with a setup nudge until it has).
    /// Defaults to `true` so connectors without this concept (tests,
    /// `NullRouter`) never get stuck nudging.
    async fn is_initialized(&self, _session_key_hint: &str) -> bool {
        true
    }
}

/// Router used in tests and before the gateway wires a real one.
pub struct NullRouter;

#[async_trait]
impl MessageRouter for NullRouter {
    async fn route(&self, _request: RouteRequest) -> Result<String, String> {
        Ok("No router configured.".to_string())
    }

    async fn handle_unknown_sender(
        &self,
        _platform_user_id: &str,
        _platform_user_display: &str,
        _platform_chat_id: &str,
    ) -> Result<String, String> {
        Ok("This bot is not yet configured to respond to new users.".to_string())
    }
}
