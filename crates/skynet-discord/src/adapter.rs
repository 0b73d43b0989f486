//! Discord channel adapter.
//!
//! Wraps a serenity `Client` and drives the event loop until the process exits.
//! Reconnects automatically whenever the gateway drops — the bot is always online.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use skynet_channels::{MessageRouter, Transcriber};
use skynet_core::config::DiscordConfig;

use crate::handler::DiscordHandler;
use crate::state::DiscordState;

pub struct DiscordAdapter {
    state: Arc<DiscordState>,
}

impl DiscordAdapter {
    pub fn new(
        config: &DiscordConfig,
        vault_root: PathBuf,
        router: Arc<dyn MessageRouter>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            state: Arc::new(DiscordState::new(config.clone(), vault_root, router, transcriber)),
        }
    }

    /// Connect to Discord and keep reconnecting whenever the gateway drops.
    ///
    /// Never returns — runs for the lifetime of the process.
    pub async fn run(self) {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MESSAGE_REACTIONS;

        let mut client = loop {
            match self.build_client(intents).await {
                Ok(c) => break c,
                Err(e) => {
                    error!("Discord: initial connect failed ({e}), retrying in 30s");
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        };

        loop {
            info!("Discord: gateway connecting");

            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }

            tokio::time::sleep(Duration::from_secs(5)).await;

            client = loop {
                match self.build_client(intents).await {
                    Ok(c) => break c,
                    Err(e) => {
                        error!("Discord: reconnect failed ({e}), retrying in 30s");
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            };
        }
    }

    /// Build a fresh serenity `Client` with our event handler and config-driven presence.
    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, serenity::Error> {
        let handler = DiscordHandler {
            state: Arc::clone(&self.state),
            bot_id: OnceLock::new(),
        };

        Client::builder(&self.state.config.bot_token, intents)
            .event_handler(handler)
            .await
    }
}
