use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Protocol constants — must match OpenClaw wire protocol exactly
pub const PROTOCOL_VERSION: u32 = 3;
pub const DEFAULT_PORT: u16 = 18789;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024; // 128 KB hard cap per frame
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024; // 1 MB: slow consumer threshold
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // close if client doesn't auth in 10s
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30; // tick event cadence

/// Top-level config (skynet.toml + SKYNET_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkynetConfig {
    pub gateway: GatewayConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
}

/// The user-owned root directory holding sessions, transcripts, workspace
/// configs, plugins, and other persistent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_vault_path")]
    pub path: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: default_vault_path(),
        }
    }
}

fn default_vault_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/Parachute", home)
}

/// Container runtime settings for sandboxed (untrusted) turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_image")]
    pub image: String,
    #[serde(default = "default_sandbox_memory_limit")]
    pub memory_limit: String,
    #[serde(default = "default_sandbox_cpu_limit")]
    pub cpu_limit: String,
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_seconds: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_sandbox_image(),
            memory_limit: default_sandbox_memory_limit(),
            cpu_limit: default_sandbox_cpu_limit(),
            timeout_seconds: default_sandbox_timeout_secs(),
        }
    }
}

fn default_sandbox_image() -> String {
    "parachute-sandbox:latest".to_string()
}
fn default_sandbox_memory_limit() -> String {
    "512m".to_string()
}
fn default_sandbox_cpu_limit() -> String {
    "1.0".to_string()
}
fn default_sandbox_timeout_secs() -> u64 {
    300
}

/// Post-turn observer (C6) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_observer_idle_wake_secs")]
    pub idle_wake_seconds: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_wake_seconds: default_observer_idle_wake_secs(),
        }
    }
}

fn default_observer_idle_wake_secs() -> u64 {
    30
}

impl Default for SkynetConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
                auth: AuthConfig {
                    mode: AuthMode::Token,
                    token: Some("change-me".to_string()),
                    password: None,
                },
            },
            agent: AgentConfig {
                model: "claude-sonnet-4-6".to_string(),
                soul_path: None,
            },
            providers: ProvidersConfig::default(),
            channels: ChannelsConfig::default(),
            vault: VaultConfig::default(),
            sandbox: SandboxConfig::default(),
            observer: ObserverConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Token,
    Password,
    Tailscale,
    DeviceToken,
    TrustedProxy,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    pub soul_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// The agent runtime is a single opaque CLI subprocess (see
/// `skynet-orchestrator::agent_runtime`), so the only provider this
/// config carries is the one consumer outside that runtime: the post-turn
/// observer's direct Anthropic API calls.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
    pub matrix: Option<MatrixConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Users permitted to open a DM directly. Empty denies all (deny-by-default).
    #[serde(default)]
    pub allow_users: Vec<String>,
    /// Default trust level for sessions created by this connector.
    #[serde(default = "default_connector_trust")]
    pub default_trust: String,
    /// When true, direct messages are accepted at all.
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
    /// When true, group/supergroup messages are only processed on an
    /// explicit `@bot_username` mention.
    #[serde(default)]
    pub require_mention: bool,
    /// Reaction emoji sent as an instant ack before the per-chat lock is
    /// acquired, removed once the response is delivered.
    #[serde(default = "default_ack_emoji")]
    pub ack_emoji: String,
    /// Largest attachment, in bytes, downloaded and saved to the vault.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
    /// Size of the per-chat group-message ring buffer.
    #[serde(default = "default_group_history_size")]
    pub group_history_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    #[serde(default)]
    pub allow_users: Vec<String>,
    #[serde(default = "default_connector_trust")]
    pub default_trust: String,
    /// When true, guild messages are only processed when the bot is @mentioned.
    /// Defaults to false (respond to all messages in channels).
    #[serde(default)]
    pub require_mention: bool,
    /// When true, direct messages (DMs) are accepted.
    /// Defaults to true.
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
    #[serde(default = "default_ack_emoji")]
    pub ack_emoji: String,
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
    #[serde(default = "default_group_history_size")]
    pub group_history_size: usize,
    /// Create a thread per conversation instead of replying in-channel.
    #[serde(default)]
    pub auto_thread: bool,
    /// Show 🧠/✅/❌ reaction status on the triggering message.
    #[serde(default = "bool_true")]
    pub ack_reactions: bool,
    /// Gateway presence: `online` (default), `idle`, `dnd`, `invisible`.
    #[serde(default = "default_discord_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    /// `"none"` (default), `"openai_whisper"`, or `"whisper_cpp"`.
    #[serde(default = "default_voice_transcription")]
    pub voice_transcription: String,
}

fn default_discord_status() -> String {
    "online".to_string()
}

fn default_voice_transcription() -> String {
    "none".to_string()
}

fn default_connector_trust() -> String {
    "sandboxed".to_string()
}

fn default_ack_emoji() -> String {
    "\u{1F440}".to_string() // 👀
}

fn default_max_attachment_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_group_history_size() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub homeserver_url: String,
    pub user_id: String,
    pub access_token: String,
    pub device_id: String,
    /// MXIDs allowed to open a DM with the bot directly. Empty denies all.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Room IDs/aliases auto-joined without bridge detection. Empty allows all.
    #[serde(default)]
    pub allowed_rooms: Vec<String>,
    /// `"all_messages"` or `"mention_only"` for group rooms.
    #[serde(default = "default_group_mention_mode")]
    pub group_mention_mode: String,
    #[serde(default = "default_connector_trust")]
    pub default_trust: String,
    #[serde(default = "default_group_history_size")]
    pub group_history_size: usize,
}

fn default_group_mention_mode() -> String {
    "mention_only".to_string()
}

fn bool_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/skynet.db", home)
}

impl SkynetConfig {
    /// Load config from a TOML file with SKYNET_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.skynet/skynet.toml  (native)
    ///   3. ~/.openclaw/openclaw.json  (migration path — Phase 2)
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SkynetConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SKYNET_").split("_"))
            .extract()
            .map_err(|e| crate::error::SkynetError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/skynet.toml", home)
}
