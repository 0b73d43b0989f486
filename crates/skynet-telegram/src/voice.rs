//! Voice-message transcription (spec §4.7).
//!
//! Downloads the voice note, hands it to a configured
//! [`skynet_channels::Transcriber`], and on success treats the
//! transcript as an ordinary text message; on failure a brief error is
//! returned to show the user.

use std::sync::Arc;

use teloxide::prelude::*;

use skynet_channels::Transcriber;

/// Resolve `msg` into text: if it's a voice message, transcribe it
/// (returning `Err` on failure); otherwise pass the plain-text/caption
/// content through unchanged.
pub async fn resolve_text(
    bot: &Bot,
    msg: &Message,
    transcriber: Option<&Arc<dyn Transcriber>>,
    max_bytes: u64,
) -> Result<String, String> {
    if msg.voice().is_none() {
        return Ok(msg.text().or(msg.caption()).unwrap_or("").to_string());
    }

    let Some(transcriber) = transcriber else {
        return Err("Voice messages aren't supported right now.".to_string());
    };

    let bytes = crate::attach::download_voice_bytes(bot, msg, max_bytes)
        .await
        .ok_or_else(|| "Couldn't download that voice message.".to_string())?;

    transcriber
        .transcribe(&bytes, "audio/ogg")
        .await
        .map_err(|e| format!("Transcription failed: {e}"))
}
