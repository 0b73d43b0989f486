//! Shared pairing-request shape for unknown senders (spec §4.7).
//!
//! A connector only *produces* these through
//! [`crate::router::MessageRouter::handle_unknown_sender`]; persistence
//! and the approve/deny actions live in the gateway, keyed by
//! `(platform, platform_user_id)` so a second message from the same
//! unknown user never spawns a duplicate request (property P13).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRequest {
    pub id: String,
    pub platform: String,
    pub platform_user_id: String,
    pub platform_user_display: String,
    pub platform_chat_id: String,
    pub status: PairingStatus,
    pub created_at: String,
}

impl PairingRequest {
    pub fn new(
        platform: impl Into<String>,
        platform_user_id: impl Into<String>,
        platform_user_display: impl Into<String>,
        platform_chat_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            platform: platform.into(),
            platform_user_id: platform_user_id.into(),
            platform_user_display: platform_user_display.into(),
            platform_chat_id: platform_chat_id.into(),
            status: PairingStatus::Pending,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Stable key a store dedupes pending requests on (property P13).
    pub fn dedup_key(platform: &str, platform_user_id: &str) -> String {
        format!("{platform}:{platform_user_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_starts_pending() {
        let req = PairingRequest::new("telegram", "123", "alice", "123");
        assert_eq!(req.status, PairingStatus::Pending);
        assert_eq!(req.platform, "telegram");
    }

    #[test]
    fn dedup_key_is_platform_scoped() {
        assert_eq!(
            PairingRequest::dedup_key("telegram", "123"),
            "telegram:123"
        );
        assert_ne!(
            PairingRequest::dedup_key("telegram", "123"),
            PairingRequest::dedup_key("discord", "123")
        );
    }
}
