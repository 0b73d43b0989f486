//! Two-stage capability filtering: trust filter, then workspace filter.
//!
//! Stage 1 ([`filter_by_trust_level`]) drops any MCP server tagged with a
//! trust requirement the current session doesn't meet. Stage 2
//! ([`filter_capabilities`]) narrows the remaining MCPs, skills, and agents
//! down to a workspace's explicit allow-policy (`"all"`, `"none"`, or a
//! named list), and decides which plugin directories are included.

use serde::{Deserialize, Serialize};

use crate::trust::{trust_rank, TrustLevel};

/// An external tool-server descriptor. Opaque to the core beyond its name
/// and optional trust tag — the MCP's own configuration is not our concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpDescriptor {
    pub name: String,
    /// The minimum trust level a session must have to use this MCP.
    /// `None` means "available regardless of trust level".
    pub trust_level: Option<TrustLevel>,
}

/// A workspace's declared policy for one capability category
/// (MCPs, skills, or agents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilitySet {
    All,
    None,
    Named(Vec<String>),
}

impl Default for CapabilitySet {
    fn default() -> Self {
        CapabilitySet::All
    }
}

/// A workspace's full capability policy, as loaded from its config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceCapabilityPolicy {
    #[serde(default)]
    pub mcps: CapabilitySet,
    #[serde(default)]
    pub skills: CapabilitySet,
    #[serde(default)]
    pub agents: CapabilitySet,
    /// Plugins aren't named from a flat pool the way mcps/skills/agents
    /// are — `All`/`None`/`Named` here gate *discovered plugin slugs*,
    /// applied after `include_user` and `extra_plugin_dirs` decide which
    /// directories are even discovered.
    #[serde(default)]
    pub plugins: CapabilitySet,
    /// Whether the well-known user plugin directory (`~/.claude/plugins/`)
    /// is discovered for sessions in this workspace.
    #[serde(default = "default_true")]
    pub include_user: bool,
    /// Additional plugin directories to discover beyond the generated and
    /// user ones, checked with `is_dir()` before inclusion.
    #[serde(default)]
    pub extra_plugin_dirs: Vec<std::path::PathBuf>,
}

fn default_true() -> bool {
    true
}

/// Result of applying a workspace's capability policy.
#[derive(Debug, Clone, Default)]
pub struct FilteredCapabilities {
    pub mcp_servers: Vec<McpDescriptor>,
    pub skills: Vec<String>,
    pub agents: Vec<String>,
    pub plugin_dirs: Vec<std::path::PathBuf>,
}

/// A discovered plugin directory, tagged with its slug (for `Named`
/// filtering) and whether it's the well-known user directory (for
/// `include_user` gating).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDirSource {
    pub slug: String,
    pub path: std::path::PathBuf,
    pub is_user: bool,
}

/// Stage 1: drop MCPs whose trust tag the session's trust level doesn't
/// satisfy. An MCP with no trust tag defaults to `direct` — it's only
/// available to direct-trust sessions, same as if it had been tagged
/// explicitly.
///
/// A session may use an MCP tagged `tag` iff `trust_rank(session_trust) <=
/// trust_rank(tag)` — i.e. the session is at least as privileged as the
/// MCP requires. `Direct` (rank 0) satisfies both `direct`- and
/// `sandboxed`-tagged MCPs; `Sandboxed` (rank 1) only satisfies
/// `sandboxed`-tagged MCPs.
pub fn filter_by_trust_level(
    mcps: &[McpDescriptor],
    session_trust: TrustLevel,
) -> Vec<McpDescriptor> {
    mcps.iter()
        .filter(|mcp| {
            let tag = mcp.trust_level.unwrap_or(TrustLevel::Direct);
            trust_rank(session_trust) <= trust_rank(tag)
        })
        .cloned()
        .collect()
}

/// Apply a `CapabilitySet` policy to a candidate list, by name.
fn filter_by_set(items: &[String], set: &CapabilitySet) -> Vec<String> {
    match set {
        CapabilitySet::All => items.to_vec(),
        CapabilitySet::None => Vec::new(),
        CapabilitySet::Named(names) => items
            .iter()
            .filter(|item| names.contains(item))
            .cloned()
            .collect(),
    }
}

fn filter_mcps_by_set(items: &[McpDescriptor], set: &CapabilitySet) -> Vec<McpDescriptor> {
    match set {
        CapabilitySet::All => items.to_vec(),
        CapabilitySet::None => Vec::new(),
        CapabilitySet::Named(names) => items
            .iter()
            .filter(|item| names.contains(&item.name))
            .cloned()
            .collect(),
    }
}

/// Apply `include_user`, the `plugins` capability set (by slug), and
/// `extra_plugin_dirs` to a discovered plugin directory list. Extra
/// directories are appended unconditionally when present on disk — they
/// are an explicit workspace addition, not subject to the `plugins` gate.
pub fn filter_plugin_dirs(
    policy: &WorkspaceCapabilityPolicy,
    discovered: &[PluginDirSource],
) -> Vec<std::path::PathBuf> {
    let candidates: Vec<&PluginDirSource> = discovered
        .iter()
        .filter(|d| policy.include_user || !d.is_user)
        .collect();
    let gated: Vec<&PluginDirSource> = match &policy.plugins {
        CapabilitySet::All => candidates,
        CapabilitySet::None => Vec::new(),
        CapabilitySet::Named(names) => candidates
            .into_iter()
            .filter(|d| names.contains(&d.slug))
            .collect(),
    };
    let mut dirs: Vec<std::path::PathBuf> = gated.into_iter().map(|d| d.path.clone()).collect();
    for extra in &policy.extra_plugin_dirs {
        if extra.is_dir() && !dirs.contains(extra) {
            dirs.push(extra.clone());
        }
    }
    dirs
}

/// Stage 2: narrow the (already trust-filtered) MCPs, plus skills and
/// agents, down to a workspace's capability policy. `plugin_dirs` is the
/// already-filtered list from [`filter_plugin_dirs`].
pub fn filter_capabilities(
    policy: &WorkspaceCapabilityPolicy,
    all_mcps: &[McpDescriptor],
    all_skills: &[String],
    all_agents: &[String],
    plugin_dirs: &[std::path::PathBuf],
) -> FilteredCapabilities {
    FilteredCapabilities {
        mcp_servers: filter_mcps_by_set(all_mcps, &policy.mcps),
        skills: filter_by_set(all_skills, &policy.skills),
        agents: filter_by_set(all_agents, &policy.agents),
        plugin_dirs: plugin_dirs.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcp(name: &str, trust: Option<TrustLevel>) -> McpDescriptor {
        McpDescriptor {
            name: name.to_string(),
            trust_level: trust,
        }
    }

    #[test]
    fn filter_all_is_identity() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(filter_by_set(&items, &CapabilitySet::All), items);
    }

    #[test]
    fn filter_none_is_empty() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert!(filter_by_set(&items, &CapabilitySet::None).is_empty());
    }

    #[test]
    fn filter_named_keeps_only_listed() {
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let set = CapabilitySet::Named(vec!["a".to_string(), "c".to_string()]);
        assert_eq!(filter_by_set(&items, &set), vec!["a", "c"]);
    }

    #[test]
    fn direct_tagged_mcp_excluded_for_sandboxed_session() {
        let mcps = vec![mcp("host-fs", Some(TrustLevel::Direct))];
        let filtered = filter_by_trust_level(&mcps, TrustLevel::Sandboxed);
        assert!(filtered.is_empty());
    }

    #[test]
    fn sandboxed_tagged_mcp_included_for_both_levels() {
        let mcps = vec![mcp("web-search", Some(TrustLevel::Sandboxed))];
        assert_eq!(
            filter_by_trust_level(&mcps, TrustLevel::Direct).len(),
            1
        );
        assert_eq!(
            filter_by_trust_level(&mcps, TrustLevel::Sandboxed).len(),
            1
        );
    }

    #[test]
    fn untagged_mcp_defaults_to_direct_only() {
        let mcps = vec![mcp("generic", None)];
        assert!(filter_by_trust_level(&mcps, TrustLevel::Sandboxed).is_empty());
        assert_eq!(filter_by_trust_level(&mcps, TrustLevel::Direct).len(), 1);
    }

    #[test]
    fn plugin_filter_excludes_user_dir_when_disabled() {
        let mut policy = WorkspaceCapabilityPolicy::default();
        policy.include_user = false;
        let discovered = vec![
            PluginDirSource {
                slug: "generated".to_string(),
                path: "/vault/.skills/_generated".into(),
                is_user: false,
            },
            PluginDirSource {
                slug: "user".to_string(),
                path: "/home/u/.claude/plugins".into(),
                is_user: true,
            },
        ];
        let dirs = filter_plugin_dirs(&policy, &discovered);
        assert_eq!(dirs, vec![std::path::PathBuf::from("/vault/.skills/_generated")]);
    }

    #[test]
    fn plugin_filter_named_keeps_only_listed_slug() {
        let policy = WorkspaceCapabilityPolicy {
            plugins: CapabilitySet::Named(vec!["alpha".to_string()]),
            ..Default::default()
        };
        let discovered = vec![
            PluginDirSource {
                slug: "alpha".to_string(),
                path: "/a".into(),
                is_user: false,
            },
            PluginDirSource {
                slug: "beta".to_string(),
                path: "/b".into(),
                is_user: false,
            },
        ];
        let dirs = filter_plugin_dirs(&policy, &discovered);
        assert_eq!(dirs, vec![std::path::PathBuf::from("/a")]);
    }
}
