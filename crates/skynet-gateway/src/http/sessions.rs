//! `GET/PUT/DELETE /sessions[...]` and `GET /sessions/{id}/transcript`.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use skynet_sessions::{locate_transcript, reconstruct_messages};

use crate::app::AppState;
use crate::auth::check_auth;

#[derive(Deserialize)]
pub struct ListQuery {
    workspace_id: Option<String>,
    #[serde(default)]
    include_archived: bool,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"})))
}

fn not_found(err: impl ToString) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": err.to_string()})))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let sessions = state
        .sessions
        .list_sessions(query.workspace_id.as_deref(), query.include_archived, query.limit)
        .map_err(not_found)?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let session = state.sessions.get_by_id(&id).map_err(not_found)?;
    Ok(Json(serde_json::json!(session)))
}

#[derive(Deserialize, Default)]
pub struct SessionUpdateRequest {
    title: Option<String>,
    archived: Option<bool>,
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<SessionUpdateRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    if let Some(title) = &req.title {
        state.sessions.set_title_by_user(&id, title).map_err(not_found)?;
    }
    match req.archived {
        Some(true) => {
            state.sessions.archive_session(&id).map_err(not_found)?;
        }
        Some(false) => {
            state.sessions.unarchive_session(&id).map_err(not_found)?;
        }
        None => {}
    }
    let session = state.sessions.get_by_id(&id).map_err(not_found)?;
    Ok(Json(serde_json::json!(session)))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    state.sessions.delete_session(&id).map_err(not_found)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Serialize)]
struct TranscriptMessageJson {
    role: String,
    content: String,
}

pub async fn get_transcript(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let session = state.sessions.get_by_id(&id).map_err(not_found)?;
    let cwd = session.working_directory.clone().unwrap_or_default();
    let claude_home = std::env::var_os("HOME")
        .map(|h| Path::new(&h).join(".claude"))
        .unwrap_or_else(|| Path::new(".claude").to_path_buf());

    let Some((path, _root)) = locate_transcript(&claude_home, state.vault_path(), &cwd, &id) else {
        return Err(not_found("no transcript found for this session"));
    };
    let messages = reconstruct_messages(&path)
        .map_err(not_found)?
        .into_iter()
        .map(|m| TranscriptMessageJson { role: m.role, content: m.content })
        .collect::<Vec<_>>();
    Ok(Json(serde_json::json!({ "messages": messages })))
}
