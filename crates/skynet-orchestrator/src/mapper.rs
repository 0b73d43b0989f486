//! Phase 9: translate the agent runtime's native JSON event vocabulary
//! (shared, by construction, between the direct CLI path in
//! `agent_runtime.rs` and the containerized path in
//! `skynet_sandbox::docker`) into the normalized [`crate::events::TurnEvent`]
//! stream every caller sees.
//!
//! The runtime's own shape is `claude -p --output-format stream-json`'s:
//! a `system`/`init` event, one `assistant` event per turn of model output
//! (whose `message.content` is a block list of `text`/`thinking`/
//! `tool_use`), a `user` event carrying `tool_result` blocks, and a
//! terminal `result` event. `error` and `resume_failed` are synthesized by
//! `agent_runtime`/`docker` themselves, not the runtime.

use serde_json::Value;

use crate::events::TurnEvent;

/// Accumulates the state one turn's worth of mapping needs: the
/// cumulative assistant text (to compute `Text::delta`) and the
/// agent-runtime session id once it's been seen in the stream.
#[derive(Debug, Default)]
pub struct EventMapper {
    cumulative_text: String,
    captured_session_id: Option<String>,
    captured_model: Option<String>,
    tool_calls: Vec<String>,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.captured_session_id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.captured_model.as_deref()
    }

    pub fn final_response(&self) -> &str {
        &self.cumulative_text
    }

    /// Names of every tool the agent runtime invoked this turn, in order,
    /// including duplicates. Empty when no tool was used.
    pub fn tool_calls(&self) -> &[String] {
        &self.tool_calls
    }

    /// Map one raw runtime event to zero or more normalized events. A
    /// single `assistant` event with several content blocks can expand
    /// into several `TurnEvent`s (e.g. `thinking` then `text` then
    /// `tool_use`).
    pub fn map(&mut self, raw: &Value) -> Vec<TurnEvent> {
        let Some(kind) = raw.get("type").and_then(Value::as_str) else {
            return Vec::new();
        };

        if let Some(sid) = raw.get("session_id").or_else(|| raw.get("sessionId")).and_then(Value::as_str) {
            if !sid.is_empty() {
                self.captured_session_id = Some(sid.to_string());
            }
        }

        match kind {
            "system" => self.map_system(raw),
            "assistant" => self.map_assistant(raw),
            "user" => self.map_user(raw),
            "result" => self.map_result(raw),
            "error" => vec![TurnEvent::Error {
                message: raw
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown agent error")
                    .to_string(),
            }],
            "resume_failed" => vec![TurnEvent::ResumeFailed {
                reason: raw
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("resume failed")
                    .to_string(),
            }],
            _ => Vec::new(),
        }
    }

    fn map_system(&mut self, raw: &Value) -> Vec<TurnEvent> {
        if raw.get("subtype").and_then(Value::as_str) != Some("init") {
            return Vec::new();
        }
        let model = raw.get("model").and_then(Value::as_str).unwrap_or("unknown").to_string();
        self.captured_model = Some(model.clone());
        let tools = raw
            .get("tools")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let permission_mode = raw
            .get("permissionMode")
            .or_else(|| raw.get("permission_mode"))
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        vec![
            TurnEvent::Init {
                model: model.clone(),
            },
            TurnEvent::Model { model },
            // Surfaced as a synthetic tool-result so a client learns what
            // the runtime will actually permit this turn, independent of
            // the pre-turn `PromptMetadata` trust-derived projection.
            TurnEvent::ToolResult {
                tool_use_id: "__init__".to_string(),
                content: serde_json::json!({ "tools": tools, "permission_mode": permission_mode }),
                is_error: false,
            },
        ]
    }

    fn map_assistant(&mut self, raw: &Value) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        let Some(blocks) = raw
            .pointer("/message/content")
            .and_then(Value::as_array)
        else {
            return out;
        };

        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("thinking") => {
                    let content = block.get("thinking").and_then(Value::as_str).unwrap_or("").to_string();
                    out.push(TurnEvent::Thinking { content });
                }
                Some("text") => {
                    let text = block.get("text").and_then(Value::as_str).unwrap_or("");
                    let delta = text.to_string();
                    self.cumulative_text.push_str(text);
                    out.push(TurnEvent::Text {
                        content: self.cumulative_text.clone(),
                        delta,
                    });
                }
                Some("tool_use") => {
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                    self.tool_calls.push(name.clone());
                    out.push(TurnEvent::ToolUse {
                        tool_use_id: block.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                        name,
                        input: block.get("input").cloned().unwrap_or(Value::Null),
                    });
                }
                _ => {}
            }
        }
        out
    }

    fn map_user(&mut self, raw: &Value) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        let Some(blocks) = raw.pointer("/message/content").and_then(Value::as_array) else {
            return out;
        };
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("tool_result") {
                out.push(TurnEvent::ToolResult {
                    tool_use_id: block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    content: block.get("content").cloned().unwrap_or(Value::Null),
                    is_error: block.get("is_error").and_then(Value::as_bool).unwrap_or(false),
                });
            }
        }
        out
    }

    fn map_result(&mut self, raw: &Value) -> Vec<TurnEvent> {
        // `result` carries the final, authoritative response text — prefer
        // it over the accumulated text-block deltas if present (the SDK
        // sometimes folds a trailing summary in here that isn't replayed
        // as its own `assistant` text block).
        if let Some(result_text) = raw.get("result").and_then(Value::as_str) {
            if !result_text.is_empty() {
                self.cumulative_text = result_text.to_string();
            }
        }
        // `Done` itself is assembled by `turn.rs`, which also needs
        // broker denial counts and the finalized session id — this mapper
        // only tracks the bits visible in the raw event stream.
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn init_event_captures_model() {
        let mut mapper = EventMapper::new();
        let events = mapper.map(&json!({
            "type": "system", "subtype": "init", "model": "claude-opus", "tools": ["bash"], "session_id": "abc"
        }));
        assert_eq!(mapper.model(), Some("claude-opus"));
        assert_eq!(mapper.session_id(), Some("abc"));
        assert!(events.iter().any(|e| matches!(e, TurnEvent::Init { model } if model == "claude-opus")));
    }

    #[test]
    fn text_blocks_accumulate_and_delta_correctly() {
        let mut mapper = EventMapper::new();
        let first = mapper.map(&json!({
            "type": "assistant",
            "message": { "content": [{"type": "text", "text": "Hello"}] }
        }));
        let second = mapper.map(&json!({
            "type": "assistant",
            "message": { "content": [{"type": "text", "text": ", world"}] }
        }));
        match &first[0] {
            TurnEvent::Text { content, delta } => {
                assert_eq!(content, "Hello");
                assert_eq!(delta, "Hello");
            }
            _ => panic!("expected text event"),
        }
        match &second[0] {
            TurnEvent::Text { content, delta } => {
                assert_eq!(content, "Hello, world");
                assert_eq!(delta, ", world");
            }
            _ => panic!("expected text event"),
        }
    }

    #[test]
    fn tool_use_block_maps_with_id_name_input() {
        let mut mapper = EventMapper::new();
        let events = mapper.map(&json!({
            "type": "assistant",
            "message": { "content": [{"type": "tool_use", "id": "t1", "name": "bash", "input": {"cmd": "ls"}}] }
        }));
        match &events[0] {
            TurnEvent::ToolUse { tool_use_id, name, input } => {
                assert_eq!(tool_use_id, "t1");
                assert_eq!(name, "bash");
                assert_eq!(input["cmd"], "ls");
            }
            _ => panic!("expected tool_use event"),
        }
    }

    #[test]
    fn result_event_overrides_cumulative_text() {
        let mut mapper = EventMapper::new();
        mapper.map(&json!({"type": "assistant", "message": {"content": [{"type":"text","text":"partial"}]}}));
        mapper.map(&json!({"type": "result", "result": "final answer", "session_id": "s1"}));
        assert_eq!(mapper.final_response(), "final answer");
    }

    #[test]
    fn error_and_resume_failed_map_directly() {
        let mut mapper = EventMapper::new();
        let err = mapper.map(&json!({"type": "error", "error": "boom"}));
        assert!(matches!(&err[0], TurnEvent::Error { message } if message == "boom"));
        let resume = mapper.map(&json!({"type": "resume_failed", "reason": "container gone"}));
        assert!(matches!(&resume[0], TurnEvent::ResumeFailed { reason } if reason == "container gone"));
    }
}
