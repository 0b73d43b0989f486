//! One-shot vault discovery feeding the orchestrator's [`CapabilityBundle`].
//!
//! Run once at process startup rather than per turn — MCP descriptors,
//! skills, agents, plugin directories, and `CLAUDE.md` only change when the
//! operator edits the vault, not on every message. The same on-disk layout
//! is mounted read-only into sandboxed containers by `skynet-sandbox`'s
//! `build_capability_mounts`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use skynet_capabilities::filter::{McpDescriptor, PluginDirSource};
use skynet_capabilities::trust::TrustLevel;
use skynet_orchestrator::CapabilityBundle;

const PLUGINS_DIR: &str = ".parachute/plugins";
const AGENTS_DIR: &str = ".parachute/agents";
const SKILLS_DIR: &str = ".skills";
const MCP_CONFIG: &str = ".mcp.json";
const CLAUDE_MD: &str = "CLAUDE.md";

/// Scan `vault_path` for everything a turn's capability filter needs: the
/// root `CLAUDE.md`, global MCP servers (`.mcp.json`), skills
/// (`.skills/<name>/SKILL.md`), custom agents (`.parachute/agents/<name>.md`),
/// and managed plugin directories (`.parachute/plugins/<slug>/`) plus the
/// well-known user plugin directory.
pub fn discover(vault_path: &Path) -> CapabilityBundle {
    let claude_md = fs::read_to_string(vault_path.join(CLAUDE_MD)).ok();
    let all_mcps = discover_mcps(vault_path);
    let all_skills = discover_skills(vault_path);
    let all_agents = discover_agents(vault_path);

    let mut discovered_plugin_dirs = Vec::new();
    let plugins_dir = vault_path.join(PLUGINS_DIR);
    if let Ok(entries) = fs::read_dir(&plugins_dir) {
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                let slug = entry.file_name().to_string_lossy().to_string();
                discovered_plugin_dirs.push(PluginDirSource {
                    slug,
                    path: entry.path(),
                    is_user: false,
                });
            }
        }
    }
    if let Some(home) = dirs_home() {
        let user_dir = home.join(".claude/plugins");
        if user_dir.is_dir() {
            discovered_plugin_dirs.push(PluginDirSource {
                slug: "user".to_string(),
                path: user_dir,
                is_user: true,
            });
        }
    }

    CapabilityBundle {
        all_mcps,
        all_skills,
        all_agents,
        discovered_plugin_dirs,
        claude_md,
        context_files: Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct McpConfigEntry {
    trust_level: Option<TrustLevel>,
}

/// Read `.mcp.json`'s top-level server map. Each value may carry a
/// `trust_level` field to tag the server for stage 1 filtering; the rest
/// of the entry (command, args, env, url, headers...) is the agent
/// runtime's concern, not ours, so it's ignored here and re-read verbatim
/// by `agent_runtime`/`docker` when building the actual MCP config.
///
/// A missing or malformed file yields no servers rather than failing
/// startup — a broken `.mcp.json` shouldn't take the whole gateway down.
fn discover_mcps(vault_path: &Path) -> Vec<McpDescriptor> {
    let path = vault_path.join(MCP_CONFIG);
    let Ok(contents) = fs::read_to_string(&path) else {
        return Vec::new();
    };
    let Ok(raw) = serde_json::from_str::<serde_json::Value>(&contents) else {
        tracing::warn!(path = %path.display(), "malformed .mcp.json, ignoring");
        return Vec::new();
    };
    let Some(servers) = raw
        .get("mcpServers")
        .and_then(|v| v.as_object())
        .or_else(|| raw.as_object())
    else {
        return Vec::new();
    };

    servers
        .iter()
        .map(|(name, value)| {
            let trust_level = serde_json::from_value::<McpConfigEntry>(value.clone())
                .ok()
                .and_then(|e| e.trust_level);
            McpDescriptor {
                name: name.clone(),
                trust_level,
            }
        })
        .collect()
}

/// Each skill lives in its own directory under `.skills/` with a
/// `SKILL.md` describing it; the directory name is the skill's name.
fn discover_skills(vault_path: &Path) -> Vec<String> {
    let dir = vault_path.join(SKILLS_DIR);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join("SKILL.md").is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect()
}

/// Custom agents are markdown definitions directly under
/// `.parachute/agents/`; the file stem (without `.md`) is the agent's name.
fn discover_agents(vault_path: &Path) -> Vec<String> {
    let dir = vault_path.join(AGENTS_DIR);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let path = entry.path();
            (path.extension().and_then(|e| e.to_str()) == Some("md"))
                .then(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
                .flatten()
        })
        .collect()
}

fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_mcps_reads_top_level_and_wrapped_forms() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MCP_CONFIG),
            r#"{"mcpServers": {"github": {"command": "npx", "trust_level": "sandboxed"}, "host-fs": {"command": "fs"}}}"#,
        )
        .unwrap();
        let mut mcps = discover_mcps(dir.path());
        mcps.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(mcps.len(), 2);
        assert_eq!(mcps[0].name, "github");
        assert_eq!(mcps[0].trust_level, Some(TrustLevel::Sandboxed));
        assert_eq!(mcps[1].name, "host-fs");
        assert_eq!(mcps[1].trust_level, None);
    }

    #[test]
    fn discover_mcps_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_mcps(dir.path()).is_empty());
    }

    #[test]
    fn discover_skills_requires_skill_md() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(SKILLS_DIR).join("summarize")).unwrap();
        fs::write(dir.path().join(SKILLS_DIR).join("summarize").join("SKILL.md"), "# summarize").unwrap();
        fs::create_dir_all(dir.path().join(SKILLS_DIR).join("empty")).unwrap();

        let skills = discover_skills(dir.path());
        assert_eq!(skills, vec!["summarize".to_string()]);
    }

    #[test]
    fn discover_agents_lists_markdown_file_stems() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(AGENTS_DIR)).unwrap();
        fs::write(dir.path().join(AGENTS_DIR).join("researcher.md"), "# researcher").unwrap();
        fs::write(dir.path().join(AGENTS_DIR).join("notes.txt"), "ignored").unwrap();

        let agents = discover_agents(dir.path());
        assert_eq!(agents, vec!["researcher".to_string()]);
    }
}
