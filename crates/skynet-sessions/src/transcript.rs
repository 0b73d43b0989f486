//! Locating and writing Claude Code SDK transcripts.
//!
//! The SDK stores each session's JSONL transcript under
//! `~/.claude/projects/<encoded-cwd>/<session-id>.jsonl`, where the
//! project directory name is the working directory with every `/`
//! replaced by `-`. Sandboxed turns run in an ephemeral container whose
//! transcript never reaches the host, so after a sandboxed turn
//! completes we synthesize an equivalent transcript on the host
//! (`write_sandbox_transcript_append`) so future turns can resume as if
//! the turn had run natively.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::error::Result;

/// Encode a working directory into the SDK's project-directory naming
/// scheme: every `/` becomes `-`.
pub fn encode_project_path(cwd: &str) -> String {
    cwd.replace('/', "-")
}

/// Inverse of `encode_project_path`. Lossy when the original path
/// contained a literal `-` where a `/` also could have been, but the SDK
/// itself has this same ambiguity — we only use this for display/lookup
/// fallback, never as the sole source of truth.
pub fn decode_project_path(encoded: &str) -> String {
    encoded.replace('-', "/")
}

fn claude_projects_dir(claude_home: &Path) -> PathBuf {
    claude_home.join("projects")
}

/// Build the expected transcript path for a session id under a given
/// working directory, without checking whether it exists.
pub fn transcript_path(claude_home: &Path, cwd: &str, session_id: &str) -> PathBuf {
    claude_projects_dir(claude_home)
        .join(encode_project_path(cwd))
        .join(format!("{session_id}.jsonl"))
}

/// Check whether the SDK already has a transcript for this session under
/// the given working directory.
pub fn transcript_exists(claude_home: &Path, cwd: &str, session_id: &str) -> bool {
    transcript_path(claude_home, cwd, session_id).is_file()
}

/// Search every project directory for a transcript named `{session_id}.jsonl`,
/// used when the working directory the session was created under is no
/// longer known (e.g. it moved, or was never recorded).
pub fn find_transcript_any_cwd(claude_home: &Path, session_id: &str) -> Option<PathBuf> {
    let dir = claude_projects_dir(claude_home);
    let entries = std::fs::read_dir(&dir).ok()?;
    for entry in entries.flatten() {
        if !entry.file_type().ok()?.is_dir() {
            continue;
        }
        let candidate = entry.path().join(format!("{session_id}.jsonl"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Which of the three canonical roots a transcript was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRoot {
    /// `<home>/.claude/projects/<encoded_cwd>/<id>.jsonl` — the computed path.
    Computed,
    /// Some other subdirectory of `<home>/.claude/projects/`.
    AnyCwd,
    /// `<vault>/.claude/projects/…` — the legacy root.
    LegacyVault,
}

/// Three-tier transcript lookup: the computed path under the session's
/// working directory, then any project subdirectory of `<home>/.claude/
/// projects/`, then the legacy `<vault>/.claude/projects/` root. The first
/// match wins.
///
/// Callers resuming a session MUST use the cwd corresponding to
/// `TranscriptRoot::AnyCwd`/`LegacyVault` matches (encoded in the returned
/// path's parent directory name), not the session's originally stored cwd,
/// since the runtime keys storage off cwd.
pub fn locate_transcript(
    claude_home: &Path,
    vault_path: &Path,
    cwd: &str,
    session_id: &str,
) -> Option<(PathBuf, TranscriptRoot)> {
    let computed = transcript_path(claude_home, cwd, session_id);
    if computed.is_file() {
        return Some((computed, TranscriptRoot::Computed));
    }
    if let Some(found) = find_transcript_any_cwd(claude_home, session_id) {
        return Some((found, TranscriptRoot::AnyCwd));
    }
    let legacy_home = vault_path.join(".claude");
    if let Some(found) = find_transcript_any_cwd(&legacy_home, session_id) {
        return Some((found, TranscriptRoot::LegacyVault));
    }
    None
}

/// One reconstructed message from a transcript, for the observer and for
/// resume-by-injection fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
}

/// Walk a transcript's JSONL lines in order and reconstruct a flat message
/// list: one message per top-level `user`/`assistant` event (string
/// payloads taken verbatim, block-list payloads' text blocks concatenated),
/// plus a trailing assistant message for a terminal `result` event that
/// carries its own text. Malformed lines are skipped rather than failing
/// the whole reconstruction — a transcript is append-only and a single
/// corrupt line shouldn't hide everything before it.
pub fn reconstruct_messages(path: &Path) -> Result<Vec<TranscriptMessage>> {
    let contents = std::fs::read_to_string(path)?;
    let mut messages = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
        match event_type {
            "user" | "assistant" => {
                let Some(message) = event.get("message") else {
                    continue;
                };
                let role = message
                    .get("role")
                    .and_then(|r| r.as_str())
                    .unwrap_or(event_type)
                    .to_string();
                if let Some(text) = extract_text_payload(message.get("content")) {
                    messages.push(TranscriptMessage { role, content: text });
                }
            }
            "result" => {
                if let Some(text) = event
                    .get("result")
                    .and_then(|r| r.as_str())
                    .filter(|s| !s.is_empty())
                {
                    messages.push(TranscriptMessage {
                        role: "assistant".to_string(),
                        content: text.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(messages)
}

/// Extract a plain-text string from either a bare string payload or a
/// block-list payload (concatenating each block's `text` field).
fn extract_text_payload(content: Option<&serde_json::Value>) -> Option<String> {
    match content? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(blocks) => {
            let mut out = String::new();
            for block in blocks {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
            if out.is_empty() {
                None
            } else {
                Some(out)
            }
        }
        _ => None,
    }
}

/// Append a synthetic user/assistant/result transcript entry for a
/// sandboxed turn, in the same JSONL shape the SDK itself would have
/// written, so a later resume attempt sees a transcript that looks native.
///
/// Creates the project directory and file if they don't exist yet.
pub fn write_sandbox_transcript_append(
    claude_home: &Path,
    cwd: &str,
    session_id: &str,
    user_text: &str,
    assistant_text: &str,
) -> Result<PathBuf> {
    let path = transcript_path(claude_home, cwd, session_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let now = chrono::Utc::now().to_rfc3339();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;

    let user_line = json!({
        "type": "user",
        "message": { "role": "user", "content": user_text },
        "sessionId": session_id,
        "timestamp": now,
    });
    let assistant_line = json!({
        "type": "assistant",
        "message": { "role": "assistant", "content": assistant_text },
        "sessionId": session_id,
        "timestamp": now,
    });
    let result_line = json!({
        "type": "result",
        "sessionId": session_id,
        "timestamp": now,
    });

    for line in [&user_line, &assistant_line, &result_line] {
        writeln!(file, "{line}")?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip_for_simple_paths() {
        let cwd = "/vault/projects/demo";
        let encoded = encode_project_path(cwd);
        assert_eq!(encoded, "-vault-projects-demo");
        assert_eq!(decode_project_path(&encoded), cwd);
    }

    #[test]
    fn transcript_exists_false_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!transcript_exists(dir.path(), "/vault/demo", "sess-1"));
    }

    #[test]
    fn write_then_find_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sandbox_transcript_append(dir.path(), "/vault/demo", "sess-1", "hi", "hello")
            .unwrap();
        assert!(path.is_file());
        assert!(transcript_exists(dir.path(), "/vault/demo", "sess-1"));

        let found = find_transcript_any_cwd(dir.path(), "sess-1").unwrap();
        assert_eq!(found, path);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn locate_transcript_falls_back_to_legacy_vault_root() {
        let home = tempfile::tempdir().unwrap();
        let vault = tempfile::tempdir().unwrap();
        let legacy_home = vault.path().join(".claude");
        write_sandbox_transcript_append(&legacy_home, "/vault/old-project", "sess-legacy", "hi", "hello")
            .unwrap();

        let (found, root) =
            locate_transcript(home.path(), vault.path(), "/vault/demo", "sess-legacy").unwrap();
        assert_eq!(root, TranscriptRoot::LegacyVault);
        assert!(found.is_file());
    }

    #[test]
    fn locate_transcript_prefers_computed_path() {
        let home = tempfile::tempdir().unwrap();
        let vault = tempfile::tempdir().unwrap();
        let path =
            write_sandbox_transcript_append(home.path(), "/vault/demo", "sess-1", "hi", "hello").unwrap();

        let (found, root) = locate_transcript(home.path(), vault.path(), "/vault/demo", "sess-1").unwrap();
        assert_eq!(root, TranscriptRoot::Computed);
        assert_eq!(found, path);
    }

    #[test]
    fn reconstruct_messages_round_trips_user_and_assistant_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sandbox_transcript_append(dir.path(), "/vault/demo", "sess-1", "hi", "hello")
            .unwrap();

        let messages = reconstruct_messages(&path).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn reconstruct_messages_concatenates_block_list_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let line = json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "part one"},
                    {"type": "tool_use", "id": "x"},
                    {"type": "text", "text": "part two"},
                ]
            },
        });
        std::fs::write(&path, format!("{line}\n")).unwrap();

        let messages = reconstruct_messages(&path).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "part one\npart two");
    }

    #[test]
    fn reconstruct_messages_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        std::fs::write(&path, "not json\n{\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":\"ok\"}}\n")
            .unwrap();

        let messages = reconstruct_messages(&path).unwrap();
        assert_eq!(messages, vec![TranscriptMessage { role: "user".to_string(), content: "ok".to_string() }]);
    }
}
