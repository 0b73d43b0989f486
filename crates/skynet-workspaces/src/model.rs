//! Workspace configuration types.
//!
//! A workspace pins a working directory, a default trust level, and a
//! capability policy together under a stable slug, so connectors can hand
//! the orchestrator a single identifier instead of three separate
//! overrides on every turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skynet_capabilities::{TrustLevel, WorkspaceCapabilityPolicy};

/// Sandbox-specific overrides a workspace can apply on top of the global
/// sandbox defaults. `None` fields fall back to `SandboxConfig`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxPolicy {
    #[serde(default)]
    pub network_enabled: Option<bool>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// A workspace as persisted to `.parachute/workspaces/{slug}/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub working_directory: String,
    pub default_trust_level: TrustLevel,
    #[serde(default)]
    pub capabilities: WorkspaceCapabilityPolicy,
    #[serde(default)]
    pub sandbox: SandboxPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a workspace. `slug` is derived from
/// `name` if not given explicitly.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceCreate {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub working_directory: String,
    #[serde(default = "default_trust_level_str")]
    pub default_trust_level: String,
    #[serde(default)]
    pub capabilities: WorkspaceCapabilityPolicy,
    #[serde(default)]
    pub sandbox: SandboxPolicy,
}

fn default_trust_level_str() -> String {
    "sandboxed".to_string()
}

/// Partial update — every field is optional, absent means "leave as is".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub working_directory: Option<String>,
    pub default_trust_level: Option<String>,
    pub capabilities: Option<WorkspaceCapabilityPolicy>,
    pub sandbox: Option<SandboxPolicy>,
}
