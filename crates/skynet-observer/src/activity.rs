//! Per-day activity log: `<vault>/Daily/.activity/<YYYY-MM-DD>.jsonl`.
//!
//! Append-only, one JSON object per exchange. Grounded on the same
//! `OpenOptions::new().create(true).append(true)` idiom
//! `skynet-sessions::transcript::write_sandbox_transcript_append` uses
//! for the agent-runtime transcript.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::ActivityLogEntry;

pub fn activity_log_path(vault_path: &Path, date: &str) -> PathBuf {
    vault_path.join("Daily").join(".activity").join(format!("{date}.jsonl"))
}

/// Append one entry to today's activity log, creating the directory and
/// file on first write.
pub fn append_activity(vault_path: &Path, entry: &ActivityLogEntry) -> Result<PathBuf> {
    let date = entry.ts.get(0..10).unwrap_or(&entry.ts).to_string();
    let path = activity_log_path(vault_path, &date);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", serde_json::to_string(entry)?)?;
    Ok(path)
}

impl From<serde_json::Error> for crate::error::ObserverError {
    fn from(e: serde_json::Error) -> Self {
        crate::error::ObserverError::ModelCall(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let entry = ActivityLogEntry {
            ts: "2026-07-30T10:00:00+00:00".to_string(),
            session_id: "s1".to_string(),
            session_title: Some("Weekend trip planning".to_string()),
            exchange_number: 1,
            summary: "Discussed mountain trip options".to_string(),
        };
        let path = append_activity(dir.path(), &entry).unwrap();
        assert!(path.ends_with("Daily/.activity/2026-07-30.jsonl"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("Weekend trip planning"));
    }

    #[test]
    fn append_is_additive_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut entry = ActivityLogEntry {
            ts: "2026-07-30T10:00:00+00:00".to_string(),
            session_id: "s1".to_string(),
            session_title: None,
            exchange_number: 1,
            summary: "first".to_string(),
        };
        append_activity(dir.path(), &entry).unwrap();
        entry.exchange_number = 2;
        entry.summary = "second".to_string();
        let path = append_activity(dir.path(), &entry).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
