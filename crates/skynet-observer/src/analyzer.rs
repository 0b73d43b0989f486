//! The analyzer's single per-turn model call: a cheap model invoked once
//! per turn, forced (via `tool_choice`) to answer through a fixed JSON
//! schema rather than free text (spec §4.6 "Structured output").
//!
//! Grounded on `skynet-agent::anthropic`'s request-building shape
//! (auth header selection, `/v1/messages` POST, error classification) —
//! deliberately *not* a dependency on `skynet-agent` itself, since the
//! agent runtime is an opaque subprocess collaborator per spec §1 and the
//! observer's own structured-output call is a distinct, much narrower
//! concern that needs no multi-provider routing.

use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ObserverError, Result};
use crate::types::AnalysisResult;

const ANALYZER_MODEL: &str = "claude-haiku-4-5";
const API_VERSION: &str = "2023-06-01";
const STRUCTURED_TOOL_NAME: &str = "record_observation";

const SYSTEM_PROMPT: &str = "You silently observe one exchange in an ongoing \
conversation between a user and their personal agent. Given the user's \
message and the assistant's reply, decide: (1) whether the session needs a \
short title (only if it doesn't have a good one yet), (2) an updated \
one-paragraph summary of the conversation so far, and (3) a one-line \
activity description for a daily log. Always call record_observation \
exactly once with your answer; never reply with plain text.";

pub struct Analyzer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Analyzer {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Run the structured-output call for one exchange. Never returns an
    /// error to a caller that treats observer failures as non-fatal — see
    /// `worker::run_task`, which wraps this in its own catch-all.
    pub async fn analyze(
        &self,
        user_message: &str,
        assistant_text: &str,
        tool_call_summary: &str,
        has_existing_title: bool,
    ) -> Result<AnalysisResult> {
        let body = request_body(user_message, assistant_text, tool_call_summary, has_existing_title);
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ObserverError::ModelCall(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ObserverError::ModelCall(format!("{status}: {text}")));
        }

        let value: Value = resp.json().await.map_err(|e| ObserverError::ModelCall(e.to_string()))?;
        extract_tool_input(&value).ok_or_else(|| ObserverError::ModelCall("model did not call record_observation".to_string()))
    }
}

fn request_body(user_message: &str, assistant_text: &str, tool_call_summary: &str, has_existing_title: bool) -> Value {
    let user_content = format!(
        "User: {user_message}\nAssistant: {assistant_text}\nTools used: {}\nSession already has a title: {has_existing_title}",
        if tool_call_summary.is_empty() { "(none)" } else { tool_call_summary }
    );
    json!({
        "model": ANALYZER_MODEL,
        "max_tokens": 512,
        "system": SYSTEM_PROMPT,
        "messages": [{ "role": "user", "content": user_content }],
        "tools": [{
            "name": STRUCTURED_TOOL_NAME,
            "description": "Record the structured observation for this exchange.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "title": { "type": ["string", "null"] },
                    "summary": { "type": ["string", "null"] },
                    "activity": { "type": "string" },
                    "exchange_description": { "type": ["string", "null"] }
                },
                "required": ["activity"]
            }
        }],
        "tool_choice": { "type": "tool", "name": STRUCTURED_TOOL_NAME },
    })
}

fn extract_tool_input(response: &Value) -> Option<AnalysisResult> {
    let blocks = response.pointer("/content")?.as_array()?;
    for block in blocks {
        if block.get("type").and_then(Value::as_str) == Some("tool_use")
            && block.get("name").and_then(Value::as_str) == Some(STRUCTURED_TOOL_NAME)
        {
            let input = block.get("input")?.clone();
            return serde_json::from_value(input).map_err(|e| warn!(error = %e, "malformed analyzer tool input")).ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_forces_tool_choice() {
        let body = request_body("hi", "hello", "", false);
        assert_eq!(body["tool_choice"]["name"], STRUCTURED_TOOL_NAME);
        assert_eq!(body["model"], ANALYZER_MODEL);
    }

    #[test]
    fn extracts_tool_input_from_content_blocks() {
        let response = json!({
            "content": [
                { "type": "text", "text": "ignored" },
                { "type": "tool_use", "name": STRUCTURED_TOOL_NAME, "input": { "activity": "chatted about trips", "title": "Trip planning" } }
            ]
        });
        let result = extract_tool_input(&response).unwrap();
        assert_eq!(result.activity, "chatted about trips");
        assert_eq!(result.title.as_deref(), Some("Trip planning"));
    }

    #[test]
    fn missing_tool_use_block_returns_none() {
        let response = json!({ "content": [{ "type": "text", "text": "oops" }] });
        assert!(extract_tool_input(&response).is_none());
    }
}
