//! Connector configuration persistence and lifecycle control (`/bots/*`).
//!
//! `.parachute/bots.yaml` holds the three platform configs under one
//! mode-0600 file (spec §6's persisted-layout table); `BotsSupervisor`
//! starts/stops the connector tasks each config section describes and
//! reports simple running/stopped status per platform.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use skynet_channels::{MessageRouter, Transcriber, WhisperBackend, WhisperTranscriber};
use skynet_core::config::{DiscordConfig, MatrixConfig, TelegramConfig};
use skynet_discord::DiscordAdapter;
use skynet_matrix::{GroupMentionMode, MatrixConnector, MatrixConnectorConfig};
use skynet_telegram::TelegramAdapter;

use crate::router::GatewayMessageRouter;

const BOTS_CONFIG_PATH: &str = ".parachute/bots.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotsConfig {
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
    pub matrix: Option<MatrixConfig>,
}

impl BotsConfig {
    pub fn load(vault_path: &Path) -> Self {
        let path = vault_path.join(BOTS_CONFIG_PATH);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_yaml::from_str(&raw).unwrap_or_default(),
            Err(_) => BotsConfig::default(),
        }
    }

    pub fn save(&self, vault_path: &Path) -> std::io::Result<()> {
        let path = vault_path.join(BOTS_CONFIG_PATH);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        std::fs::write(&path, yaml)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }
        Ok(())
    }
}

/// Tracks the running connector tasks so `/bots/{platform}/{start,stop}`
/// is idempotent: starting an already-running connector is a no-op,
/// stopping aborts its task and drops the handle.
#[derive(Default)]
pub struct BotsSupervisor {
    telegram: std::sync::Mutex<Option<JoinHandle<()>>>,
    discord: std::sync::Mutex<Option<JoinHandle<()>>>,
    matrix: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BotsSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "telegram": self.telegram.lock().unwrap().is_some(),
            "discord": self.discord.lock().unwrap().is_some(),
            "matrix": self.matrix.lock().unwrap().is_some(),
        })
    }

    pub fn start_telegram(&self, config: &TelegramConfig, vault_root: PathBuf, router: Arc<dyn MessageRouter>) {
        let mut slot = self.telegram.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let transcriber = build_transcriber(&config.allow_users);
        let adapter = TelegramAdapter::new(config, vault_root, router, transcriber);
        *slot = Some(tokio::spawn(async move {
            adapter.run().await;
        }));
        info!("telegram connector started");
    }

    pub fn stop_telegram(&self) {
        if let Some(handle) = self.telegram.lock().unwrap().take() {
            handle.abort();
            info!("telegram connector stopped");
        }
    }

    pub fn start_discord(&self, config: &DiscordConfig, vault_root: PathBuf, router: Arc<dyn MessageRouter>) {
        let mut slot = self.discord.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let transcriber = WhisperBackend::from_config(&config.voice_transcription)
            .map(|b| Arc::new(WhisperTranscriber::new(b)) as Arc<dyn Transcriber>);
        let adapter = DiscordAdapter::new(config, vault_root, router, transcriber);
        *slot = Some(tokio::spawn(async move {
            adapter.run().await;
        }));
        info!("discord connector started");
    }

    pub fn stop_discord(&self) {
        if let Some(handle) = self.discord.lock().unwrap().take() {
            handle.abort();
            info!("discord connector stopped");
        }
    }

    pub fn start_matrix(&self, config: &MatrixConfig, router: Arc<dyn MessageRouter>) {
        let mut slot = self.matrix.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let mention_mode = if config.group_mention_mode == "all_messages" {
            GroupMentionMode::AllMessages
        } else {
            GroupMentionMode::MentionOnly
        };
        let connector_config = MatrixConnectorConfig {
            homeserver_url: config.homeserver_url.clone(),
            user_id: config.user_id.clone(),
            access_token: config.access_token.clone(),
            device_id: config.device_id.clone(),
            allowed_users: config.allowed_users.clone(),
            allowed_rooms: config.allowed_rooms.clone(),
            group_mention_mode: mention_mode,
        };
        let mut connector = MatrixConnector::new(connector_config, router);
        *slot = Some(tokio::spawn(async move {
            use skynet_channels::Channel;
            if let Err(e) = connector.connect().await {
                warn!(error = %e, "matrix connector failed to connect");
            }
        }));
        info!("matrix connector started");
    }

    pub fn stop_matrix(&self) {
        if let Some(handle) = self.matrix.lock().unwrap().take() {
            handle.abort();
            info!("matrix connector stopped");
        }
    }
}

/// Telegram's transcription config lives on `allow_users`' sibling field
/// in a future revision; for now Telegram has no `voice_transcription`
/// knob of its own (Discord is the only connector with one configured in
/// `skynet_core::config`), so Telegram never gets a transcriber.
fn build_transcriber(_allow_users: &[String]) -> Option<Arc<dyn Transcriber>> {
    None
}

pub fn router_for(
    orchestrator: Arc<skynet_orchestrator::Orchestrator>,
    capabilities: skynet_orchestrator::CapabilityBundle,
    pairing: Arc<crate::router::PairingStore>,
    platform: &str,
) -> Arc<dyn MessageRouter> {
    Arc::new(GatewayMessageRouter::new(orchestrator, capabilities, pairing, platform))
}
