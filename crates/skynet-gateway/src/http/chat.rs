//! `POST /chat` — the SSE turn stream, plus its two sidecar endpoints:
//! `POST /chat/abort/{session_id}` and `POST /chat/answer/{request_id}`.
//!
//! Grounded on `skynet_orchestrator::turn::Orchestrator::run_turn`'s
//! `TurnEvent` stream and on `skynet_permissions::broker::PermissionBroker`
//! for out-of-band answers to `UserQuestion` events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use skynet_orchestrator::TurnInput;
use skynet_sessions::SessionSource;

use crate::app::AppState;
use crate::auth::check_auth;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default = "default_session_name")]
    pub session_name: String,
    pub message: String,
    #[serde(default)]
    pub client_trust: Option<String>,
    #[serde(default)]
    pub workspace_slug: Option<String>,
    #[serde(default)]
    pub working_directory_override: Option<String>,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    #[serde(default = "default_source")]
    pub source: SessionSource,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_agent_id() -> String {
    "main".to_string()
}
fn default_session_name() -> String {
    "main".to_string()
}
fn default_agent_type() -> String {
    "general".to_string()
}
fn default_source() -> SessionSource {
    SessionSource::ClaudeCodeSdk
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_timeout() -> u64 {
    300
}

#[derive(Serialize)]
struct ChatError {
    error: String,
}

/// `POST /chat` — streams a turn's normalized events as SSE, one `data:`
/// line per `TurnEvent`, JSON-encoded with its own `type` tag.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ChatError>)> {
    if !check_auth(&state, &headers) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ChatError {
                error: "unauthorized".to_string(),
            }),
        ));
    }
    if req.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError {
                error: "message cannot be empty".to_string(),
            }),
        ));
    }

    let input = TurnInput {
        user_id: req.user_id,
        agent_id: req.agent_id,
        session_name: req.session_name,
        message: req.message,
        client_trust: req.client_trust,
        workspace_slug: req.workspace_slug,
        working_directory_override: req.working_directory_override,
        agent_type: req.agent_type,
        source: req.source,
        model: req.model,
        timeout_seconds: req.timeout_seconds,
    };

    let turn_stream = state.orchestrator.run_turn(input, state.capabilities.clone());
    let sse_stream = turn_stream.map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(payload))
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// `POST /chat/abort/{session_id}` — signal a live turn to stop at its
/// next suspension point.
pub async fn abort_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if !check_auth(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"})));
    }
    let found = state.orchestrator.abort(&session_id);
    (StatusCode::OK, Json(serde_json::json!({"aborted": found})))
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    #[serde(default)]
    pub denied: bool,
    #[serde(default)]
    pub answer: Option<Value>,
}

/// `POST /chat/answer/{request_id}` — resolve a pending `UserQuestion`
/// event raised mid-turn.
pub async fn answer_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> impl IntoResponse {
    if !check_auth(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"})));
    }

    let result = if req.denied {
        state.broker.deny_permission(&request_id)
    } else {
        state.broker.grant_permission(&request_id, req.answer.unwrap_or(Value::Null))
    };

    match result {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"ok": true}))),
        Err(e) => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": e.to_string()}))),
    }
}
