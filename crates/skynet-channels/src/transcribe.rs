//! Voice-message transcription capability (spec §4.7: "hand to a
//! `transcribe` capability on the server if available").
//!
//! Optional by design — a connector with no transcriber configured
//! simply replies with an error instead of processing the audio.

use async_trait::async_trait;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe raw audio bytes (format given by `mime`, e.g.
    /// `audio/ogg`) to text. Failure is reported as `Err(reason)` — the
    /// connector surfaces a brief error to the user rather than
    /// propagating it.
    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, String>;
}

/// Backend selection for [`WhisperTranscriber`], parsed from the
/// `voice_transcription` config key shared by every connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperBackend {
    OpenAiApi,
    LocalCpp,
}

impl WhisperBackend {
    pub fn from_config(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai_whisper" | "openai" | "whisper_api" => Some(Self::OpenAiApi),
            "whisper_cpp" | "whisper" | "local" => Some(Self::LocalCpp),
            _ => None,
        }
    }
}

/// Whisper-backed transcriber: the OpenAI Whisper API, or a local
/// `whisper` (whisper.cpp) subprocess. Shared across every connector so
/// the gateway only wires the backend choice once.
pub struct WhisperTranscriber {
    backend: WhisperBackend,
}

impl WhisperTranscriber {
    pub fn new(backend: WhisperBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8], _mime: &str) -> Result<String, String> {
        match self.backend {
            WhisperBackend::OpenAiApi => transcribe_openai(audio).await,
            WhisperBackend::LocalCpp => transcribe_whisper_cpp(audio).await,
        }
    }
}

async fn transcribe_openai(audio_bytes: &[u8]) -> Result<String, String> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| "OPENAI_API_KEY not set for whisper transcription".to_string())?;

    let part = reqwest::multipart::Part::bytes(audio_bytes.to_vec())
        .file_name("audio.ogg")
        .mime_str("audio/ogg")
        .map_err(|e| e.to_string())?;

    let form = reqwest::multipart::Form::new()
        .text("model", "whisper-1")
        .part("file", part);

    let client = reqwest::Client::new();
    let resp = client
        .post("https://api.openai.com/v1/audio/transcriptions")
        .header("Authorization", format!("Bearer {api_key}"))
        .multipart(form)
        .send()
        .await
        .map_err(|e| format!("Whisper API request failed: {e}"))?;

    if !resp.status().is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("Whisper API error: {body}"));
    }

    let json: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
    json["text"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| "No 'text' field in Whisper response".to_string())
}

async fn transcribe_whisper_cpp(audio_bytes: &[u8]) -> Result<String, String> {
    use tokio::process::Command;

    let pid = std::process::id();
    let tmp_input = format!("/tmp/skynet_whisper_{pid}.ogg");

    tokio::fs::write(&tmp_input, audio_bytes)
        .await
        .map_err(|e| format!("Failed to write temp audio: {e}"))?;

    let output = Command::new("whisper")
        .args(["--model", "base", "--output-format", "txt", "--output-dir", "/tmp", &tmp_input])
        .output()
        .await
        .map_err(|e| format!("whisper.cpp not found or failed to execute: {e}"))?;

    let _ = tokio::fs::remove_file(&tmp_input).await;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("whisper.cpp failed: {stderr}"));
    }

    let txt_output = format!("/tmp/skynet_whisper_{pid}.txt");
    let text = tokio::fs::read_to_string(&txt_output)
        .await
        .map_err(|e| format!("Failed to read whisper output: {e}"))?;
    let _ = tokio::fs::remove_file(&txt_output).await;

    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parsing_recognizes_aliases() {
        assert_eq!(WhisperBackend::from_config("openai"), Some(WhisperBackend::OpenAiApi));
        assert_eq!(WhisperBackend::from_config("whisper_cpp"), Some(WhisperBackend::LocalCpp));
        assert_eq!(WhisperBackend::from_config("none"), None);
        assert_eq!(WhisperBackend::from_config(""), None);
    }
}
