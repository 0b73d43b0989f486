//! Shared state handed to every Telegram update handler.

use std::path::PathBuf;
use std::sync::Arc;

use skynet_channels::{ConnectorRuntime, MessageRouter, Transcriber};
use skynet_core::config::TelegramConfig;

pub struct TelegramState {
    pub runtime: ConnectorRuntime,
    pub config: TelegramConfig,
    pub vault_root: PathBuf,
}

impl TelegramState {
    pub fn new(
        config: TelegramConfig,
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
