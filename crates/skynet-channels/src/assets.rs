//! Shared attachment persistence (spec §6 persisted layout:
//! `Chat/assets/<YYYY-MM-DD>/<HH-MM-SS>_<name>.<ext>`).
//!
//! Every connector downloads platform media and saves it here before
//! routing the turn, so the message text can carry a vault-relative
//! reference instead of inline bytes.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// Save `bytes` under `<vault_root>/Chat/assets/<today>/<time>_<name>`,
/// returning the vault-relative path (`Chat/assets/...`) to reference in
/// the outgoing turn message.
pub async fn save_asset(
    vault_root: &Path,
    original_name: &str,
    bytes: &[u8],
) -> std::io::Result<String> {
    let now = chrono::Utc::now();
    let date = now.format("%Y-%m-%d").to_string();
    let time = now.format("%H-%M-%S").to_string();
    let dir = vault_root.join("Chat").join("assets").join(&date);
    tokio::fs::create_dir_all(&dir).await?;

    let safe_name = sanitize_filename(original_name);
    let filename = format!("{time}_{safe_name}");
    let full_path: PathBuf = dir.join(&filename);

    let mut file = tokio::fs::File::create(&full_path).await?;
    file.write_all(bytes).await?;

    Ok(format!("Chat/assets/{date}/{filename}"))
}

/// Strip path separators and other characters that would escape the
/// target directory or confuse a filesystem.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
    }

    #[test]
    fn sanitize_keeps_simple_names() {
        assert_eq!(sanitize_filename("photo.jpg"), "photo.jpg");
    }

    #[test]
    fn sanitize_empty_falls_back() {
        assert_eq!(sanitize_filename(""), "attachment");
    }

    #[tokio::test]
    async fn save_asset_writes_under_dated_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let rel = save_asset(tmp.path(), "pic.png", b"hello").await.unwrap();
        assert!(rel.starts_with("Chat/assets/"));
        let full = tmp.path().join(&rel);
        assert_eq!(tokio::fs::read(&full).await.unwrap(), b"hello");
    }
}
