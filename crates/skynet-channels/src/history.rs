//! Per-chat group-message ring buffer (spec §3 "Connector state").
//!
//! Every connector records incoming group text here *before* checking
//! the allowlist, so a later allowed message can be answered with the
//! preceding conversational context even though the bot never replied
//! to the earlier, unaddressed messages.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct GroupHistoryEntry {
    pub user_display: String,
    pub text: String,
    pub timestamp: String,
    pub message_id: String,
}

/// Bounded per-chat ring buffers, capped at `capacity` entries each.
pub struct GroupHistory {
    capacity: usize,
    chats: Mutex<HashMap<String, VecDeque<GroupHistoryEntry>>>,
}

impl GroupHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Record one message, evicting the oldest entry once the chat's
    /// buffer is at capacity.
    pub fn record(&self, chat_id: &str, entry: GroupHistoryEntry) {
        let mut chats = self.chats.lock().unwrap();
        let buf = chats.entry(chat_id.to_string()).or_default();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(entry);
    }

    /// Snapshot the current buffer for a chat, oldest first.
    pub fn snapshot(&self, chat_id: &str) -> Vec<GroupHistoryEntry> {
        let chats = self.chats.lock().unwrap();
        chats
            .get(chat_id)
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Render the buffer as a `<prior_conversation>`-style text block,
    /// or `None` if the chat has no recorded history yet.
    pub fn render_context(&self, chat_id: &str) -> Option<String> {
        let snapshot = self.snapshot(chat_id);
        if snapshot.is_empty() {
            return None;
        }
        Some(
            snapshot
                .iter()
                .map(|e| format!("{}: {}", e.user_display, e.text))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

impl Default for GroupHistory {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> GroupHistoryEntry {
        GroupHistoryEntry {
            user_display: "alice".to_string(),
            text: text.to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            message_id: "1".to_string(),
        }
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let history = GroupHistory::new(2);
        history.record("chat1", entry("a"));
        history.record("chat1", entry("b"));
        history.record("chat1", entry("c"));
        let snap = history.snapshot("chat1");
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].text, "b");
        assert_eq!(snap[1].text, "c");
    }

    #[test]
    fn chats_are_isolated() {
        let history = GroupHistory::new(10);
        history.record("chat1", entry("a"));
        assert!(history.snapshot("chat2").is_empty());
    }

    #[test]
    fn render_context_is_none_when_empty() {
        let history = GroupHistory::new(10);
        assert!(history.render_context("chat1").is_none());
    }

    #[test]
    fn render_context_joins_entries() {
        let history = GroupHistory::new(10);
        history.record("chat1", entry("hello"));
        history.record("chat1", entry("world"));
        let rendered = history.render_context("chat1").unwrap();
        assert_eq!(rendered, "alice: hello\nalice: world");
    }
}
