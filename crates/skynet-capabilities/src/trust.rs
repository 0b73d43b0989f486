//! Trust level normalization and ordering.
//!
//! Canonical values are `direct` and `sandboxed`. Legacy synonyms
//! (`trusted`, `full`, `vault` → `direct`; `untrusted` → `sandboxed`) are
//! accepted on input only — every ingress point (workspace config, client
//! request, MCP trust tag) normalizes through `normalize` rather than
//! repeating its own mapping table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A session's (or an MCP's trust tag's) effective trust level.
///
/// `Direct` sessions run the agent runtime in-process with no sandbox.
/// `Sandboxed` sessions run it inside a restricted container (C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Direct,
    Sandboxed,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Direct => "direct",
            TrustLevel::Sandboxed => "sandboxed",
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown trust level: {0}")]
pub struct UnknownTrustLevel(pub String);

/// Parse a trust level string, mapping legacy synonyms to their canonical
/// form first. Rejects anything else (property P7: idempotent, rejects
/// unknown strings).
pub fn normalize(raw: &str) -> Result<TrustLevel, UnknownTrustLevel> {
    let mapped = match raw {
        "trusted" | "full" | "vault" => "direct",
        "untrusted" => "sandboxed",
        other => other,
    };
    match mapped {
        "direct" => Ok(TrustLevel::Direct),
        "sandboxed" => Ok(TrustLevel::Sandboxed),
        _ => Err(UnknownTrustLevel(raw.to_string())),
    }
}

/// Lower rank = more privileged. `Direct` outranks `Sandboxed`.
///
/// Used to compute the *more restrictive of two* trust levels: a workspace
/// trust floor or a client-requested escalation is only honored if it does
/// not raise the rank (i.e. does not request a more privileged level than
/// already in effect).
pub fn trust_rank(level: TrustLevel) -> u8 {
    match level {
        TrustLevel::Direct => 0,
        TrustLevel::Sandboxed => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["direct", "sandboxed"] {
            let once = normalize(raw).unwrap();
            let twice = normalize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn normalize_legacy_synonyms() {
        assert_eq!(normalize("trusted").unwrap(), TrustLevel::Direct);
        assert_eq!(normalize("full").unwrap(), TrustLevel::Direct);
        assert_eq!(normalize("vault").unwrap(), TrustLevel::Direct);
        assert_eq!(normalize("untrusted").unwrap(), TrustLevel::Sandboxed);
    }

    #[test]
    fn normalize_rejects_unknown() {
        assert!(normalize("omniscient").is_err());
    }

    #[test]
    fn direct_outranks_sandboxed() {
        assert!(trust_rank(TrustLevel::Direct) < trust_rank(TrustLevel::Sandboxed));
    }
}
