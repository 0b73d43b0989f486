//! Inbound attachment handling for the Discord adapter.
//!
//! Downloads attachments over HTTP and saves them under the vault's
//! `Chat/assets/<date>/` directory (spec §6), so the outgoing turn
//! message can carry a vault-relative reference instead of inline
//! bytes.

use std::path::Path;

use serenity::model::channel::Attachment;
use tracing::warn;

/// Attachment classification by MIME type / filename.
pub enum AttachmentKind {
    Voice,
    Other,
}

/// Classify a Discord attachment. Discord voice messages are OGG files
/// with `audio/ogg` content type.
pub fn classify(attachment: &Attachment) -> AttachmentKind {
    let ct = attachment.content_type.as_deref().unwrap_or("");
    if ct == "audio/ogg" && attachment.filename.ends_with(".ogg") {
        AttachmentKind::Voice
    } else {
        AttachmentKind::Other
    }
}

/// Download and save every attachment under the vault, skipping any
/// that exceed `max_bytes`. Returns the vault-relative paths in order.
pub async fn save_all(vault_root: &Path, attachments: &[Attachment], max_bytes: u64) -> Vec<String> {
    let mut saved = Vec::new();
    for att in attachments {
        if u64::from(att.size) > max_bytes {
            warn!(filename = %att.filename, size = att.size, limit = max_bytes, "Discord: attachment exceeds size limit, skipping");
            continue;
        }
        match download_bytes(&att.url).await {
            Ok(bytes) => match skynet_channels::assets::save_asset(vault_root, &att.filename, &bytes).await {
                Ok(path) => saved.push(path),
                Err(e) => warn!(filename = %att.filename, error = %e, "Discord: failed to save attachment"),
            },
            Err(e) => warn!(filename = %att.filename, error = %e, "Discord: failed to download attachment"),
        }
    }
    saved
}

/// Download a voice attachment's raw bytes for transcription, without
/// saving it to the vault.
pub async fn download_voice_bytes(attachment: &Attachment) -> Result<Vec<u8>, String> {
    download_bytes(&attachment.url).await.map_err(|e| e.to_string())
}

async fn download_bytes(url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let resp = reqwest::get(url).await?;
    resp.bytes().await.map(|b| b.to_vec())
}

#[cfg(test)]
mod tests {
    #[test]
    fn size_guard_boundary() {
        let max: u64 = 20 * 1024 * 1024;
        assert!(max - 1 < max);
        assert!(max > max - 1);
    }
}
