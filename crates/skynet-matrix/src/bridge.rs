//! Bridge-ghost-user detection for mautrix-bridged Matrix rooms.
//!
//! Ported from `_compile_ghost_patterns`/`_detect_bridge_room` in the
//! original Matrix connector: ghost-user patterns are scoped to the
//! local homeserver domain so a federated user who merely *looks* like
//! a bridge ghost (`@telegram_123:evil.example`) is never misclassified
//! as one.

use regex::Regex;

/// Known mautrix bridge prefixes (`@meta_123:…`, `@telegram_456:…`, …).
pub const BRIDGE_GHOST_PREFIXES: &[&str] = &["meta", "telegram", "discord", "signal", "whatsapp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChatType {
    Dm,
    Group,
}

#[derive(Debug, Clone)]
pub struct BridgeInfo {
    pub bridge_type: String,
    pub ghost_users: Vec<String>,
    pub bridge_bots: Vec<String>,
    pub remote_chat_type: RemoteChatType,
}

/// Compile ghost-user and bridge-bot patterns scoped to `homeserver_domain`.
pub struct BridgePatterns {
    ghost: Vec<Regex>,
    bots: Regex,
}

impl BridgePatterns {
    pub fn new(homeserver_domain: &str) -> Self {
        let escaped = regex::escape(homeserver_domain);
        let ghost = BRIDGE_GHOST_PREFIXES
            .iter()
            .map(|prefix| Regex::new(&format!(r"^@{prefix}_\d+:{escaped}(:\d+)?$")).expect("static pattern"))
            .collect();
        let bots = Regex::new(r"^@(meta|telegram|discord|signal|whatsapp)bot:.+$").expect("static pattern");
        Self { ghost, bots }
    }

    /// Inspect a room's member list and classify it as bridged (if any
    /// ghost user is present) or not. One ghost = bridged DM, 2+ = group.
    pub fn detect(&self, member_ids: &[String]) -> Option<BridgeInfo> {
        let mut ghost_users = Vec::new();
        let mut bridge_bots = Vec::new();
        let mut bridge_type = None;

        for member_id in member_ids {
            if let Some(pattern) = self.ghost.iter().find(|p| p.is_match(member_id)) {
                ghost_users.push(member_id.clone());
                if bridge_type.is_none() {
                    bridge_type = extract_prefix(pattern, member_id);
                }
            }
            if self.bots.is_match(member_id) {
                bridge_bots.push(member_id.clone());
            }
        }

        if ghost_users.is_empty() {
            return None;
        }

        let remote_chat_type = if ghost_users.len() == 1 { RemoteChatType::Dm } else { RemoteChatType::Group };

        Some(BridgeInfo {
            bridge_type: bridge_type.unwrap_or_else(|| "unknown".to_string()),
            ghost_users,
            bridge_bots,
            remote_chat_type,
        })
    }
}

fn extract_prefix(_pattern: &Regex, member_id: &str) -> Option<String> {
    member_id.trim_start_matches('@').split('_').next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_single_ghost_as_bridged_dm() {
        let patterns = BridgePatterns::new("example.org");
        let info = patterns.detect(&["@telegram_123:example.org".to_string(), "@alice:example.org".to_string()]).unwrap();
        assert_eq!(info.bridge_type, "telegram");
        assert_eq!(info.remote_chat_type, RemoteChatType::Dm);
        assert_eq!(info.ghost_users.len(), 1);
    }

    #[test]
    fn multiple_ghosts_classified_as_group() {
        let patterns = BridgePatterns::new("example.org");
        let info = patterns
            .detect(&["@discord_1:example.org".to_string(), "@discord_2:example.org".to_string()])
            .unwrap();
        assert_eq!(info.remote_chat_type, RemoteChatType::Group);
    }

    #[test]
    fn federated_lookalike_not_scoped_to_domain_is_ignored() {
        let patterns = BridgePatterns::new("example.org");
        assert!(patterns.detect(&["@telegram_123:evil.example".to_string()]).is_none());
    }

    #[test]
    fn non_ghost_room_returns_none() {
        let patterns = BridgePatterns::new("example.org");
        assert!(patterns.detect(&["@alice:example.org".to_string(), "@bob:example.org".to_string()]).is_none());
    }

    #[test]
    fn bridge_bot_detected_alongside_ghost() {
        let patterns = BridgePatterns::new("example.org");
        let info = patterns
            .detect(&["@telegram_1:example.org".to_string(), "@telegrambot:example.org".to_string()])
            .unwrap();
        assert_eq!(info.bridge_bots, vec!["@telegrambot:example.org".to_string()]);
    }
}
