//! Permission Broker (C4).
//!
//! Two responsibilities: track interactive `AskUserQuestion` pauses so a
//! client can answer them out-of-band from the turn's event stream, and
//! keep a per-session tally of tool denials for the turn's final `done`
//! event. Trust-level tool gating itself is evaluated once per turn by
//! the orchestrator before the stream starts (see `skynet-capabilities`);
//! this broker is the runtime-facing half that the agent runtime's
//! `can_use_tool`/`on_denial` callbacks talk to mid-stream.

use std::collections::HashMap;
use std::sync::Mutex;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use crate::error::{PermissionError, Result};

/// An interactive question the agent runtime raised via
/// `AskUserQuestion`, waiting on a client response.
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub request_id: String,
    pub session_id: String,
    pub tool_use_id: String,
    pub question: Value,
}

/// The client's resolution of a pending question.
#[derive(Debug, Clone)]
pub enum QuestionAnswer {
    Answered(Value),
    Denied,
}

struct PendingEntry {
    question: PendingQuestion,
    responder: oneshot::Sender<QuestionAnswer>,
}

/// A recorded tool-call denial, for the turn's `permission_denials` count
/// and for surfacing to the user after the fact.
#[derive(Debug, Clone)]
pub struct DenialRecord {
    pub tool_name: String,
    pub reason: String,
}

#[derive(Default)]
struct SessionState {
    denials: Vec<DenialRecord>,
}

/// Tracks pending interactive questions and tool denials across all
/// in-flight turns. One instance is shared (behind an `Arc`) across the
/// whole gateway process.
#[derive(Default)]
pub struct PermissionBroker {
    pending: DashMap<String, PendingEntry>,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl PermissionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic request id for a session/tool-use pair, matching the
    /// format the client is told to answer against.
    pub fn request_id(session_id: &str, tool_use_id: &str) -> String {
        format!("{session_id}-q-{tool_use_id}")
    }

    /// Register an `AskUserQuestion` tool call as pending, and return the
    /// request id plus a receiver that resolves once `grant_permission`
    /// or `deny_permission` is called with that id.
    #[instrument(skip(self, question), fields(session_id, tool_use_id))]
    pub fn on_user_question(
        &self,
        session_id: &str,
        tool_use_id: &str,
        question: Value,
    ) -> (String, oneshot::Receiver<QuestionAnswer>) {
        let request_id = Self::request_id(session_id, tool_use_id);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            request_id.clone(),
            PendingEntry {
                question: PendingQuestion {
                    request_id: request_id.clone(),
                    session_id: session_id.to_string(),
                    tool_use_id: tool_use_id.to_string(),
                    question,
                },
                responder: tx,
            },
        );
        (request_id, rx)
    }

    /// Record a tool-call denial for the turn's final summary. Never
    /// returns an error — a broker bookkeeping failure must not abort an
    /// otherwise-successful turn.
    #[instrument(skip(self))]
    pub fn on_denial(&self, session_id: &str, tool_name: &str, reason: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(session_id.to_string())
            .or_default()
            .denials
            .push(DenialRecord {
                tool_name: tool_name.to_string(),
                reason: reason.to_string(),
            });
    }

    pub fn denial_count(&self, session_id: &str) -> u32 {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|s| s.denials.len() as u32)
            .unwrap_or(0)
    }

    pub fn denials(&self, session_id: &str) -> Vec<DenialRecord> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|s| s.denials.clone())
            .unwrap_or_default()
    }

    /// Resolve a pending question with the client's answer.
    pub fn grant_permission(&self, request_id: &str, answer: Value) -> Result<()> {
        let (_, entry) = self
            .pending
            .remove(request_id)
            .ok_or_else(|| PermissionError::RequestNotFound(request_id.to_string()))?;
        entry
            .responder
            .send(QuestionAnswer::Answered(answer))
            .map_err(|_| PermissionError::AlreadyResolved(request_id.to_string()))
    }

    /// Resolve a pending question as denied.
    pub fn deny_permission(&self, request_id: &str) -> Result<()> {
        let (_, entry) = self
            .pending
            .remove(request_id)
            .ok_or_else(|| PermissionError::RequestNotFound(request_id.to_string()))?;
        entry
            .responder
            .send(QuestionAnswer::Denied)
            .map_err(|_| PermissionError::AlreadyResolved(request_id.to_string()))
    }

    /// All questions still awaiting an answer for a session.
    pub fn get_pending_permissions(&self, session_id: &str) -> Vec<PendingQuestion> {
        self.pending
            .iter()
            .filter(|entry| entry.value().question.session_id == session_id)
            .map(|entry| entry.value().question.clone())
            .collect()
    }

    /// Drop all bookkeeping for a finished session — pending questions
    /// (answered or not) and its denial tally. Mirrors cleaning up
    /// `active_streams`/`pending_permissions` once a turn's stream ends.
    #[instrument(skip(self))]
    pub fn clear_session(&self, session_id: &str) {
        self.pending
            .retain(|_, entry| entry.question.session_id != session_id);
        self.sessions.lock().unwrap().remove(session_id);
        debug!("cleared permission broker state for session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grant_resolves_receiver_with_answer() {
        let broker = PermissionBroker::new();
        let (request_id, rx) = broker.on_user_question("sess-1", "tool-1", serde_json::json!({"q": "?"}));
        assert_eq!(request_id, "sess-1-q-tool-1");
        broker
            .grant_permission(&request_id, serde_json::json!({"choice": "yes"}))
            .unwrap();
        match rx.await.unwrap() {
            QuestionAnswer::Answered(v) => assert_eq!(v["choice"], "yes"),
            QuestionAnswer::Denied => panic!("expected answered"),
        }
    }

    #[tokio::test]
    async fn deny_resolves_receiver_as_denied() {
        let broker = PermissionBroker::new();
        let (request_id, rx) = broker.on_user_question("sess-1", "tool-1", Value::Null);
        broker.deny_permission(&request_id).unwrap();
        assert!(matches!(rx.await.unwrap(), QuestionAnswer::Denied));
    }

    #[test]
    fn grant_unknown_request_errors() {
        let broker = PermissionBroker::new();
        assert!(broker.grant_permission("missing", Value::Null).is_err());
    }

    #[test]
    fn denial_count_accumulates_per_session() {
        let broker = PermissionBroker::new();
        broker.on_denial("sess-1", "exec_command", "not allowed at this trust level");
        broker.on_denial("sess-1", "write_file", "read-only path");
        broker.on_denial("sess-2", "exec_command", "other session");
        assert_eq!(broker.denial_count("sess-1"), 2);
        assert_eq!(broker.denial_count("sess-2"), 1);
    }

    #[test]
    fn clear_session_drops_pending_and_denials() {
        let broker = PermissionBroker::new();
        broker.on_user_question("sess-1", "tool-1", Value::Null);
        broker.on_denial("sess-1", "exec_command", "denied");
        broker.clear_session("sess-1");
        assert!(broker.get_pending_permissions("sess-1").is_empty());
        assert_eq!(broker.denial_count("sess-1"), 0);
    }
}
