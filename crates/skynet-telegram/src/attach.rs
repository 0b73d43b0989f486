//! Inbound media handling for the Telegram adapter.
//!
//! Downloads Telegram media via `get_file` + `download_file` and saves
//! it under the vault's `Chat/assets/<date>/` directory (spec §6), so
//! the outgoing turn message can carry a vault-relative reference
//! instead of inline bytes.

use std::path::Path;

use teloxide::net::Download;
use teloxide::prelude::*;
use tracing::warn;

/// Extract the first supported media item from a Telegram message and
/// save it under the vault. Returns the vault-relative path, or `None`
/// when the message has no media, the file exceeds `max_bytes`, or the
/// download failed.
pub async fn extract_media(
    bot: &Bot,
    msg: &Message,
    vault_root: &Path,
    max_bytes: u64,
) -> Option<String> {
    if let Some(photos) = msg.photo() {
        if let Some(photo) = photos.last() {
            return download_and_save(bot, &photo.file.id, "photo.jpg", vault_root, max_bytes).await;
        }
    }
    if let Some(doc) = msg.document() {
        let name = doc.file_name.clone().unwrap_or_else(|| "document".to_string());
        return download_and_save(bot, &doc.file.id, &name, vault_root, max_bytes).await;
    }
    if let Some(video) = msg.video() {
        return download_and_save(bot, &video.file.id, "video.mp4", vault_root, max_bytes).await;
    }
    if let Some(audio) = msg.audio() {
        return download_and_save(bot, &audio.file.id, "audio.mp3", vault_root, max_bytes).await;
    }
    if let Some(voice) = msg.voice() {
        return download_and_save(bot, &voice.file.id, "voice.ogg", vault_root, max_bytes).await;
    }
    if let Some(sticker) = msg.sticker() {
        return download_and_save(bot, &sticker.file.id, "sticker.webp", vault_root, max_bytes).await;
    }
    None
}

/// Download a voice message's raw bytes for transcription, without
/// saving it to the vault.
pub async fn download_voice_bytes(bot: &Bot, msg: &Message, max_bytes: u64) -> Option<Vec<u8>> {
    let voice = msg.voice()?;
    let file = bot.get_file(&voice.file.id).await.ok()?;
    if u64::from(file.size) > max_bytes {
        return None;
    }
    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf).await.ok()?;
    Some(buf)
}

async fn download_and_save(
    bot: &Bot,
    file_id: &str,
    suggested_name: &str,
    vault_root: &Path,
    max_bytes: u64,
) -> Option<String> {
    let file = match bot.get_file(file_id).await {
        Ok(f) => f,
        Err(e) => {
            warn!(file_id, error = %e, "Telegram: get_file failed");
            return None;
        }
    };
    if u64::from(file.size) > max_bytes {
        warn!(file_id, size = file.size, limit = max_bytes, "Telegram: file exceeds size limit, skipping");
        return None;
    }
    let mut buf = Vec::new();
    if let Err(e) = bot.download_file(&file.path, &mut buf).await {
        warn!(file_id, error = %e, "Telegram: download_file failed");
        return None;
    }
    match skynet_channels::assets::save_asset(vault_root, suggested_name, &buf).await {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(file_id, error = %e, "Telegram: failed to save attachment");
            None
        }
    }
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
