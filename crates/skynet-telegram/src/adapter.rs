//! Telegram channel adapter.
//!
//! Wraps a teloxide `Bot` + `Dispatcher` and drives the long-polling event loop
//! until the process exits. Reconnects automatically on transport errors.

use std::path::PathBuf;
use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use skynet_channels::{MessageRouter, Transcriber};
use skynet_core::config::TelegramConfig;

use crate::handler::handle_message;
use crate::state::TelegramState;

/// Telegram channel adapter.
///
/// Wraps a teloxide `Bot` and drives the Dispatcher event loop until the
/// process exits. Long polling — no public URL required.
pub struct TelegramAdapter {
    state: Arc<TelegramState>,
}

impl TelegramAdapter {
    pub fn new(
        config: &TelegramConfig,
        vault_root: PathBuf,
        router: Arc<dyn MessageRouter>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            state: Arc::new(TelegramState::new(config.clone(), vault_root, router, transcriber)),
        }
    }

    /// Connect to Telegram and drive the long-polling loop.
    ///
    /// Never returns — runs for the lifetime of the process.
    pub async fn run(self) {
        let bot = Bot::new(&self.state.config.bot_token);

        info!("Telegram: starting long-polling dispatcher");

        let state = Arc::clone(&self.state);
        let handler = Update::filter_message().endpoint(handle_message);

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![state])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;
    }
}
