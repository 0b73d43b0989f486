//! Shared state handed to the serenity event handler.

use std::path::PathBuf;
use std::sync::Arc;

use skynet_channels::{ConnectorRuntime, MessageRouter, Transcriber};
use skynet_core::config::DiscordConfig;

pub struct DiscordState {
    pub runtime: ConnectorRuntime,
    pub config: DiscordConfig,
    pub vault_root: PathBuf,
}

impl DiscordState {
    pub fn new(
        config: DiscordConfig,
        vault_root: PathBuf,
        router: Arc<dyn MessageRouter>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        let history_size = config.group_history_size;
        Self {
            runtime: ConnectorRuntime::new(router, transcriber, history_size),
            config,
            vault_root,
        }
    }
}
