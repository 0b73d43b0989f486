use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Everything a sandboxed turn needs to build and run a container.
///
/// `session_id` must be the session's *real* id, not the `"pending"`
/// placeholder — the container's internal SDK resume logic keys off of
/// it, and resuming against `"pending"` would silently break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSandboxConfig {
    pub session_id: String,
    pub agent_type: String,
    /// Host paths to mount read-write. Each may carry a glob suffix
    /// (`/**`, `/*`) which is stripped before mounting — the mount itself
    /// is always the containing directory.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    /// The SDK needs outbound API access even inside a restricted
    /// container, so this is `true` for ordinary sandboxed turns; `false`
    /// only disables network entirely for defense-in-depth testing.
    #[serde(default = "default_true")]
    pub network_enabled: bool,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub plugin_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub mcp_servers: serde_json::Value,
    #[serde(default)]
    pub agents: Vec<String>,
    /// Already resolved to the in-container path (e.g. `/vault/...`).
    pub working_directory: String,
    /// When set, this turn runs in the persistent container for this
    /// workspace slug instead of a fresh ephemeral one.
    #[serde(default)]
    pub workspace_slug: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    300
}

impl AgentSandboxConfig {
    pub fn new(session_id: impl Into<String>, working_directory: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            agent_type: "default".to_string(),
            allowed_paths: Vec::new(),
            network_enabled: true,
            timeout_seconds: default_timeout(),
            plugin_dirs: Vec::new(),
            mcp_servers: serde_json::Value::Object(Default::default()),
            agents: Vec::new(),
            working_directory: working_directory.into(),
            workspace_slug: None,
        }
    }

    /// Bind this turn to a persistent per-workspace container instead of
    /// an ephemeral one.
    pub fn with_workspace(mut self, slug: impl Into<String>) -> Self {
        self.workspace_slug = Some(slug.into());
        self
    }
}
