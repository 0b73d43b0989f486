//! Voice-message transcription (spec §4.7).
//!
//! Downloads the voice attachment, hands it to a configured
//! [`skynet_channels::Transcriber`], and on success treats the
//! transcript as an ordinary text message; on failure a brief error is
//! returned to show the user.

use std::sync::Arc;

use serenity::model::channel::Attachment;

use skynet_channels::Transcriber;

/// Resolve `content` plus `attachments` into the text to route: if a
/// voice attachment is present, transcribe it (returning `Err` on
/// failure); otherwise pass the text content through unchanged.
pub async fn resolve_text(
    content: &str,
    attachments: &[Attachment],
    transcriber: Option<&Arc<dyn Transcriber>>,
) -> Result<String, String> {
    let Some(voice) = attachments.iter().find(|a| matches!(crate::attach::classify(a), crate::attach::AttachmentKind::Voice)) else {
        return Ok(content.to_string());
    };

    let Some(transcriber) = transcriber else {
        return Err("Voice messages aren't supported right now.".to_string());
    };

    let bytes = crate::attach::download_voice_bytes(voice)
        .await
        .map_err(|_| "Couldn't download that voice message.".to_string())?;

    transcriber
        .transcribe(&bytes, "audio/ogg")
        .await
        .map_err(|e| format!("Transcription failed: {e}"))
}
