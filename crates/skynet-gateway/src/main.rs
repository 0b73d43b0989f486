use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

mod app;
mod auth;
mod bots;
mod capabilities;
mod http;
mod router;

use skynet_observer::analyzer::Analyzer;
use skynet_observer::sink::NullSink;
use skynet_observer::worker::ObserverWorker;
use skynet_orchestrator::agent_runtime::AgentRuntime;
use skynet_orchestrator::Orchestrator;
use skynet_permissions::broker::PermissionBroker;
use skynet_permissions::policy::ToolTrustPolicy;
use skynet_sandbox::docker::DockerSandbox;
use skynet_sessions::{db::init_db, SessionManager};
use skynet_workspaces::store::WorkspaceStore;

use crate::bots::{BotsConfig, BotsSupervisor};
use crate::router::PairingStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skynet_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("SKYNET_CONFIG").ok();
    let config = skynet_core::config::SkynetConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        skynet_core::config::SkynetConfig::default()
    });

    let vault_path = PathBuf::from(&config.vault.path);
    std::fs::create_dir_all(&vault_path)?;
    let claude_home = std::env::var_os("HOME")
        .map(|h| PathBuf::from(h).join(".claude"))
        .unwrap_or_else(|| PathBuf::from(".claude"));

    let db_path = PathBuf::from(&config.database.path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = rusqlite::Connection::open(&db_path)?;
    init_db(&conn)?;
    let sessions = Arc::new(SessionManager::new(conn));

    let workspaces = Arc::new(WorkspaceStore::new(vault_path.clone()));
    let sandbox = Arc::new(
        DockerSandbox::new(vault_path.clone())
            .with_image(config.sandbox.image.clone())
            .with_resource_limits(config.sandbox.memory_limit.clone(), config.sandbox.cpu_limit.clone()),
    );
    let broker = Arc::new(PermissionBroker::new());
    let agent_runtime = Arc::new(AgentRuntime::new("claude"));
    let tool_policy = ToolTrustPolicy::default();

    let observer_handle = match (config.observer.enabled, &config.providers.anthropic) {
        (true, Some(anthropic)) => {
            let (worker, handle) = ObserverWorker::new(
                sessions.clone(),
                Analyzer::new(anthropic.api_key.clone(), anthropic.base_url.clone()),
                Arc::new(NullSink),
                vault_path.clone(),
                std::time::Duration::from_secs(config.observer.idle_wake_seconds),
                64,
            );
            let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(worker.run(shutdown_rx));
            Some(Arc::new(handle))
        }
        (true, None) => {
            warn!("observer enabled but no providers.anthropic config — skipping post-turn analysis");
            None
        }
        (false, _) => None,
    };

    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        workspaces.clone(),
        sandbox.clone(),
        broker.clone(),
        agent_runtime.clone(),
        tool_policy,
        vault_path.to_string_lossy().to_string(),
        claude_home.clone(),
        observer_handle.clone(),
    ));

    let capability_bundle = capabilities::discover(&vault_path);
    let pairing = Arc::new(PairingStore::new());
    let bots_supervisor = BotsSupervisor::new();
    let bots_config = BotsConfig::load(&vault_path);

    if let Some(telegram) = &bots_config.telegram {
        let router = bots::router_for(orchestrator.clone(), capability_bundle.clone(), pairing.clone(), "telegram");
        bots_supervisor.start_telegram(telegram, vault_path.clone(), router);
    }
    if let Some(discord) = &bots_config.discord {
        let router = bots::router_for(orchestrator.clone(), capability_bundle.clone(), pairing.clone(), "discord");
        bots_supervisor.start_discord(discord, vault_path.clone(), router);
    }
    if let Some(matrix) = &bots_config.matrix {
        let router = bots::router_for(orchestrator.clone(), capability_bundle.clone(), pairing.clone(), "matrix");
        bots_supervisor.start_matrix(matrix, router);
    }

    let state = Arc::new(app::AppState {
        config: config.clone(),
        orchestrator,
        sessions,
        workspaces,
        sandbox,
        broker,
        observer: observer_handle,
        capabilities: capability_bundle,
        pairing,
        bots: bots_supervisor,
        bots_config: std::sync::Mutex::new(bots_config),
        vault_path,
        claude_home,
    });

    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("skynet gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
