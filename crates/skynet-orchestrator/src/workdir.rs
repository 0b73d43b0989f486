//! Phase 2: resolve the working directory a turn runs in.
//!
//! Precedence, highest first: an explicit per-request override, a
//! workspace/session metadata override, the session's previously stored
//! cwd, and finally the vault root. If a transcript was actually found
//! under a *different* cwd than the one resolved here (see
//! `skynet_sessions::locate_transcript`), the caller must prefer the
//! transcript's cwd for resume — the SDK keys its own storage off cwd,
//! so resuming against the wrong one silently starts a fresh session.

/// Resolve the working directory for a turn from the four candidate
/// sources, before any transcript-location fallback is applied.
pub fn resolve_working_directory(
    explicit: Option<&str>,
    metadata_override: Option<&str>,
    stored: Option<&str>,
    vault_root: &str,
) -> String {
    explicit
        .or(metadata_override)
        .or(stored)
        .unwrap_or(vault_root)
        .to_string()
}

/// Apply the transcript-location fallback: if the transcript was found
/// under a different cwd than the one initially resolved, that cwd wins
/// for this turn.
pub fn apply_transcript_cwd_override(resolved: String, transcript_cwd: Option<&str>) -> String {
    match transcript_cwd {
        Some(cwd) if cwd != resolved => cwd.to_string(),
        _ => resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_overrides_everything() {
        let cwd = resolve_working_directory(Some("/explicit"), Some("/meta"), Some("/stored"), "/vault");
        assert_eq!(cwd, "/explicit");
    }

    #[test]
    fn metadata_overrides_stored_and_vault() {
        let cwd = resolve_working_directory(None, Some("/meta"), Some("/stored"), "/vault");
        assert_eq!(cwd, "/meta");
    }

    #[test]
    fn stored_overrides_vault() {
        let cwd = resolve_working_directory(None, None, Some("/stored"), "/vault");
        assert_eq!(cwd, "/stored");
    }

    #[test]
    fn falls_back_to_vault_root() {
        let cwd = resolve_working_directory(None, None, None, "/vault");
        assert_eq!(cwd, "/vault");
    }

    #[test]
    fn transcript_cwd_override_wins_when_different() {
        let resolved = resolve_working_directory(None, None, Some("/stored"), "/vault");
        let overridden = apply_transcript_cwd_override(resolved, Some("/actual"));
        assert_eq!(overridden, "/actual");
    }

    #[test]
    fn transcript_cwd_override_noop_when_same() {
        let resolved = resolve_working_directory(None, None, Some("/stored"), "/vault");
        let overridden = apply_transcript_cwd_override(resolved, Some("/stored"));
        assert_eq!(overridden, "/stored");
    }
}
