//! Allowlist enforcement for the Discord adapter.
//!
//! Deny-by-default: an empty `allow_users` list means no one is allowed.
//! Wildcard `"*"` allows everyone. Entries may match by username or by
//! numeric Discord user ID.

/// Returns `true` when the given Discord user is permitted to interact with the bot.
pub fn is_allowed(allow_users: &[String], username: &str, user_id: &str) -> bool {
    if allow_users.is_empty() {
        return false;
    }
    allow_users.iter().any(|entry| {
        let entry = entry.trim_start_matches('@');
        entry == "*" || entry == username || entry == user_id
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_denies_all() {
        assert!(!is_allowed(&[], "alice", "111"));
    }

    #[test]
    fn wildcard_allows_all() {
        let list = vec!["*".to_string()];
        assert!(is_allowed(&list, "alice", "111"));
    }

    #[test]
    fn match_by_username() {
        let list = vec!["alice".to_string()];
        assert!(is_allowed(&list, "alice", "111"));
        assert!(!is_allowed(&list, "bob", "222"));
    }

    #[test]
    fn match_by_numeric_user_id() {
        let list = vec!["123456789".to_string()];
        assert!(is_allowed(&list, "", "123456789"));
        assert!(!is_allowed(&list, "alice", "111"));
    }
}
