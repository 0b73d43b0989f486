//! The normalized turn event stream every connector sees, regardless of
//! whether the turn ran sandboxed (translated up from a container's JSONL
//! stdout, see `skynet-sandbox::docker`) or direct (emitted straight from
//! `agent_runtime`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event in a turn's normalized stream. Serializes with an internal
/// `type` tag so it can be forwarded to a WS client unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Emitted as soon as the session is resolved (phase 1), and again
    /// after the agent runtime mints a real id (phase 9) if the session
    /// started out `"pending"`.
    Session { session_id: Option<String> },
    /// Static metadata about the turn about to run: resolved trust level,
    /// working directory, and the capabilities the agent runtime will see.
    PromptMetadata {
        trust_level: String,
        working_directory: String,
        mcp_servers: Vec<String>,
        skills: Vec<String>,
        agents: Vec<String>,
    },
    /// Echo of the user's message, emitted immediately so a client can
    /// render it before the agent has produced anything.
    UserMessage { content: String },
    /// The agent runtime has started; `model` is the resolved model id.
    Init { model: String },
    /// A model selection change mid-turn (rare; mostly for future
    /// multi-model routing).
    Model { model: String },
    /// A thinking/reasoning block, forwarded verbatim.
    Thinking { content: String },
    /// Cumulative assistant text plus the incremental delta since the
    /// last `Text` event, so a client can render either.
    Text { content: String, delta: String },
    ToolUse {
        tool_use_id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
    },
    /// An interactive `AskUserQuestion` pause. `request_id` is what a
    /// client answers against via the permission broker.
    UserQuestion { request_id: String, question: Value },
    /// Terminal: the turn completed normally.
    Done {
        response: String,
        session_id: String,
        message_count: u32,
        model: String,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<String>>,
        permission_denials: u32,
    },
    /// Terminal: the turn was cancelled via an interrupt handle (see
    /// `Orchestrator`'s `{session_id -> CancellationToken}` map).
    /// `partial_response` is whatever assistant text had accumulated
    /// before the cancellation was observed.
    Aborted {
        message: String,
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        partial_response: Option<String>,
    },
    /// Terminal: an unrecoverable error occurred.
    Error { message: String },
    /// Terminal: a typed/classified error (capability, permission,
    /// transcript, sandbox, etc.) the client can handle specifically
    /// instead of just display as text.
    TypedError { code: String, message: String },
    /// Terminal: no session could be resolved or finalized at all.
    SessionUnavailable { reason: String },
    /// Non-terminal: a persistent-container resume attempt failed; the
    /// orchestrator is about to retry with a different strategy (see
    /// `turn::ResumeStrategy`). Informational only — never the turn's
    /// only event.
    ResumeFailed { reason: String },
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnEvent::Done { .. }
                | TurnEvent::Aborted { .. }
                | TurnEvent::Error { .. }
                | TurnEvent::TypedError { .. }
                | TurnEvent::SessionUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events_classified_correctly() {
        assert!(TurnEvent::Done {
            response: "hi".into(),
            session_id: "s".into(),
            message_count: 2,
            model: "claude".into(),
            duration_ms: 10,
            tool_calls: None,
            permission_denials: 0,
        }
        .is_terminal());
        assert!(TurnEvent::Aborted {
            message: "cancelled".into(),
            session_id: "s".into(),
            partial_response: None,
        }
        .is_terminal());
        assert!(TurnEvent::Error { message: "x".into() }.is_terminal());
        assert!(!TurnEvent::UserMessage { content: "hi".into() }.is_terminal());
        assert!(!TurnEvent::ResumeFailed { reason: "x".into() }.is_terminal());
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = TurnEvent::Text {
            content: "hello".into(),
            delta: "lo".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["content"], "hello");
    }
}
