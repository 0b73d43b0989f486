//! Mention detection for group rooms in `mention_only` response mode.
//!
//! Ported from `_detect_mention`/`_strip_mention`: checks the modern
//! `m.mentions` content field first, then falls back to MXID/display-name
//! text matching for clients that don't send it.

use serde_json::Value;

pub fn detect_mention(event_content: &Value, bot_user_id: &str, body: &str) -> bool {
    if let Some(user_ids) = event_content.pointer("/m.mentions/user_ids").and_then(Value::as_array) {
        if user_ids.iter().any(|v| v.as_str() == Some(bot_user_id)) {
            return true;
        }
    }

    if body.contains(bot_user_id) {
        return true;
    }

    let localpart = mxid_localpart(bot_user_id);
    if !localpart.is_empty() && body.to_lowercase().contains(&localpart.to_lowercase()) {
        return true;
    }

    false
}

/// Strip both the full MXID and the bare localpart mention from a message.
pub fn strip_mention(body: &str, bot_user_id: &str) -> String {
    let without_mxid = body.replace(bot_user_id, "");
    let localpart = mxid_localpart(bot_user_id);
    if localpart.is_empty() {
        return without_mxid.trim().to_string();
    }
    let re = regex::Regex::new(&format!("(?i){}", regex::escape(&localpart))).expect("escaped pattern is always valid");
    re.replace_all(&without_mxid, "").trim().to_string()
}

/// `@alice:example.org` -> `alice`.
pub fn mxid_localpart(mxid: &str) -> String {
    mxid.trim_start_matches('@').split(':').next().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_via_m_mentions_field() {
        let content = json!({ "m.mentions": { "user_ids": ["@bot:example.org"] } });
        assert!(detect_mention(&content, "@bot:example.org", "hey"));
    }

    #[test]
    fn detects_via_raw_mxid_in_body() {
        let content = json!({});
        assert!(detect_mention(&content, "@bot:example.org", "hi @bot:example.org please help"));
    }

    #[test]
    fn detects_via_localpart_fallback() {
        let content = json!({});
        assert!(detect_mention(&content, "@bot:example.org", "hey bot can you help"));
    }

    #[test]
    fn no_mention_present() {
        let content = json!({});
        assert!(!detect_mention(&content, "@bot:example.org", "just chatting"));
    }

    #[test]
    fn strip_removes_mxid_and_localpart() {
        let stripped = strip_mention("hey @bot:example.org can you help, Bot?", "@bot:example.org");
        assert!(!stripped.contains("@bot:example.org"));
        assert!(!stripped.to_lowercase().contains("bot"));
    }

    #[test]
    fn localpart_extraction() {
        assert_eq!(mxid_localpart("@alice:example.org"), "alice");
    }
}
