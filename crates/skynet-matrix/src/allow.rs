//! Allowlist enforcement for the Matrix connector.
//!
//! Deny-by-default, mirroring `skynet-telegram::allow::is_allowed`:
//! an empty list denies everyone, `"*"` allows everyone, entries match
//! verbatim otherwise (Matrix user/room IDs are already fully qualified
//! — no `@`-stripping is needed the way Telegram's bare usernames need).

/// Returns `true` when `user_id` (a full MXID, e.g. `@alice:example.org`)
/// is permitted to interact with the bot directly.
pub fn is_user_allowed(allowed_users: &[String], user_id: &str) -> bool {
    if allowed_users.is_empty() {
        return false;
    }
    allowed_users.iter().any(|entry| entry == "*" || entry == user_id)
}

/// Returns `true` when `room_id` may be auto-joined without triggering
/// bridge detection or a pairing request. An empty list allows every
/// room — unlike users, rooms default open since invites are already a
/// deliberate admin action on the homeserver side.
pub fn is_room_allowed(allowed_rooms: &[String], room_id: &str) -> bool {
    if allowed_rooms.is_empty() {
        return true;
    }
    allowed_rooms.iter().any(|entry| entry == room_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_list_denies_all() {
        assert!(!is_user_allowed(&[], "@alice:example.org"));
    }

    #[test]
    fn wildcard_user_allows_all() {
        assert!(is_user_allowed(&["*".to_string()], "@anyone:example.org"));
    }

    #[test]
    fn exact_mxid_match() {
        let list = vec!["@alice:example.org".to_string()];
        assert!(is_user_allowed(&list, "@alice:example.org"));
        assert!(!is_user_allowed(&list, "@bob:example.org"));
    }

    #[test]
    fn empty_room_list_allows_all() {
        assert!(is_room_allowed(&[], "!abc:example.org"));
    }

    #[test]
    fn room_list_restricts_to_named_rooms() {
        let list = vec!["!abc:example.org".to_string()];
        assert!(is_room_allowed(&list, "!abc:example.org"));
        assert!(!is_room_allowed(&list, "!xyz:example.org"));
    }
}
