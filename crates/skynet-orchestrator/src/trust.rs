//! Phase 5: resolve a turn's effective trust level.
//!
//! Precedence, highest first: an explicit client request parameter, the
//! session's previously stored trust level, the workspace's configured
//! default, and finally `direct` if nothing else applies. A client or
//! session value that would *raise* privilege above the workspace's
//! ceiling is rejected rather than silently clamped — see
//! `skynet_core::SkynetError::TrustEscalationDenied`.

use skynet_capabilities::trust::UnknownTrustLevel;
use skynet_capabilities::{normalize, trust_rank, TrustLevel};

/// Resolve the effective trust level for a turn, applying the ceiling a
/// workspace's default trust level imposes: a more-privileged request
/// (lower rank) than the workspace default is denied, a less-privileged
/// or equal one is honored.
pub fn resolve_effective_trust(
    client_param: Option<&str>,
    session_stored: Option<&str>,
    workspace_default: TrustLevel,
) -> Result<TrustLevel, EffectiveTrustError> {
    let requested = match client_param.or(session_stored) {
        Some(raw) => normalize(raw)?,
        None => workspace_default,
    };

    if trust_rank(requested) < trust_rank(workspace_default) {
        return Err(EffectiveTrustError::EscalationDenied {
            requested: requested.as_str().to_string(),
            ceiling: workspace_default.as_str().to_string(),
        });
    }

    Ok(requested)
}

#[derive(Debug, thiserror::Error)]
pub enum EffectiveTrustError {
    #[error(transparent)]
    Unknown(#[from] UnknownTrustLevel),
    #[error("trust escalation denied: requested {requested}, ceiling {ceiling}")]
    EscalationDenied { requested: String, ceiling: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_param_takes_precedence() {
        let trust = resolve_effective_trust(Some("direct"), Some("sandboxed"), TrustLevel::Sandboxed).unwrap();
        assert_eq!(trust, TrustLevel::Direct);
    }

    #[test]
    fn falls_back_to_session_then_workspace() {
        let trust = resolve_effective_trust(None, Some("sandboxed"), TrustLevel::Sandboxed).unwrap();
        assert_eq!(trust, TrustLevel::Sandboxed);
        let trust = resolve_effective_trust(None, None, TrustLevel::Sandboxed).unwrap();
        assert_eq!(trust, TrustLevel::Sandboxed);
    }

    #[test]
    fn escalation_above_workspace_ceiling_is_denied() {
        let err = resolve_effective_trust(Some("direct"), None, TrustLevel::Sandboxed);
        // direct (rank 0) is MORE privileged than sandboxed (rank 1) —
        // this is the escalation case and must be denied when the
        // workspace ceiling is sandboxed.
        assert!(matches!(err, Err(EffectiveTrustError::EscalationDenied { .. })));
    }

    #[test]
    fn requesting_less_privilege_than_ceiling_is_allowed() {
        let trust = resolve_effective_trust(Some("sandboxed"), None, TrustLevel::Direct).unwrap();
        assert_eq!(trust, TrustLevel::Sandboxed);
    }

    #[test]
    fn legacy_synonym_normalized_before_ranking() {
        let trust = resolve_effective_trust(Some("vault"), None, TrustLevel::Sandboxed);
        assert!(matches!(trust, Err(EffectiveTrustError::EscalationDenied { .. })));
    }
}
