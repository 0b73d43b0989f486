//! Central shared state for the gateway's Axum router, plus the route
//! table that wires it to every C1-C7 collaborator.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use skynet_core::config::SkynetConfig;
use skynet_observer::worker::ObserverHandle;
use skynet_orchestrator::{CapabilityBundle, Orchestrator};
use skynet_permissions::broker::PermissionBroker;
use skynet_sandbox::docker::DockerSandbox;
use skynet_sessions::SessionManager;
use skynet_workspaces::store::WorkspaceStore;

use crate::bots::BotsConfig;
use crate::router::PairingStore;

/// Everything an HTTP handler needs, shared behind an `Arc`.
pub struct AppState {
    pub config: SkynetConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionManager>,
    pub workspaces: Arc<WorkspaceStore>,
    pub sandbox: Arc<DockerSandbox>,
    pub broker: Arc<PermissionBroker>,
    pub observer: Option<Arc<ObserverHandle>>,
    pub capabilities: CapabilityBundle,
    pub pairing: Arc<PairingStore>,
    pub bots: crate::bots::BotsSupervisor,
    pub bots_config: std::sync::Mutex<BotsConfig>,
    pub vault_path: PathBuf,
    pub claude_home: PathBuf,
}

impl AppState {
    pub fn vault_path(&self) -> &std::path::Path {
        &self.vault_path
    }
}

/// Assemble the full Axum router (spec §6's `/chat`, `/sessions`,
/// `/workspaces`, `/bots`, `/sandbox`, `/import` surface).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::ui::ui_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route("/chat/abort/{session_id}", post(crate::http::chat::abort_handler))
        .route("/chat/answer/{request_id}", post(crate::http::chat::answer_handler))
        .route("/sessions", get(crate::http::sessions::list_sessions))
        .route("/sessions/{id}", get(crate::http::sessions::get_session))
        .route("/sessions/{id}", put(crate::http::sessions::update_session))
        .route("/sessions/{id}", delete(crate::http::sessions::delete_session))
        .route("/sessions/{id}/transcript", get(crate::http::sessions::get_transcript))
        .route("/workspaces", get(crate::http::workspaces::list_workspaces))
        .route("/workspaces", post(crate::http::workspaces::create_workspace))
        .route("/workspaces/{slug}", get(crate::http::workspaces::get_workspace))
        .route("/workspaces/{slug}", put(crate::http::workspaces::update_workspace))
        .route("/workspaces/{slug}", delete(crate::http::workspaces::delete_workspace))
        .route("/bots/config", get(crate::http::bots::get_config))
        .route("/bots/config", post(crate::http::bots::save_config))
        .route("/bots/{platform}/start", post(crate::http::bots::start_bot))
        .route("/bots/{platform}/stop", post(crate::http::bots::stop_bot))
        .route("/bots/{platform}/test", post(crate::http::bots::test_bot))
        .route("/bots/pairing", get(crate::http::bots::list_pairing))
        .route("/bots/pairing/{id}/approve", post(crate::http::bots::approve_pairing))
        .route("/bots/pairing/{id}/deny", post(crate::http::bots::deny_pairing))
        .route("/sandbox/build", post(crate::http::sandbox::build_sandbox))
        .route("/sandbox/default/stop", post(crate::http::sandbox::stop_default))
        .route("/import", post(crate::http::import::import_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
