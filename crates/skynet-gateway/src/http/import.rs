//! `POST /import` — bulk-import external chat exports.
//!
//! Imported transcripts don't come from the agent runtime, so there's no
//! JSONL under `~/.claude/projects/…` to resume from. Each export is
//! persisted verbatim as markdown under `Chat/sessions/imported/` and
//! registered as a session with `source = imported_markdown`, finalized to
//! the external id so the file name (`{platform}-<id>.md`) stays
//! derivable from the session id alone.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use skynet_sessions::SessionKey;

use crate::app::AppState;
use crate::auth::check_auth;

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"})))
}

fn bad_request(err: impl ToString) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()})))
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPlatform {
    Claude,
    ChatGpt,
}

impl ImportPlatform {
    fn file_prefix(&self) -> &'static str {
        match self {
            ImportPlatform::Claude => "claude",
            ImportPlatform::ChatGpt => "chatgpt",
        }
    }
}

#[derive(Deserialize)]
pub struct ImportItem {
    platform: ImportPlatform,
    /// The id the export used on its source platform; becomes this
    /// session's id and the transcript file's `<id>` suffix.
    external_id: String,
    user_id: Option<String>,
    agent_id: Option<String>,
    title: Option<String>,
    markdown: String,
}

#[derive(Deserialize)]
pub struct ImportRequest {
    imports: Vec<ImportItem>,
}

#[derive(Serialize)]
struct ImportedSession {
    session_id: String,
    path: String,
}

#[derive(Serialize)]
struct ImportError {
    external_id: String,
    error: String,
}

pub async fn import_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ImportRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }

    let dir = state.vault_path().join("Chat").join("sessions").join("imported");
    std::fs::create_dir_all(&dir).map_err(bad_request)?;

    let mut imported = Vec::new();
    let mut errors = Vec::new();

    for item in req.imports {
        match import_one(&state, &dir, item) {
            Ok(session) => imported.push(session),
            Err((external_id, err)) => errors.push(ImportError { external_id, error: err }),
        }
    }

    Ok(Json(serde_json::json!({ "imported": imported, "errors": errors })))
}

fn import_one(
    state: &AppState,
    dir: &std::path::Path,
    item: ImportItem,
) -> Result<ImportedSession, (String, String)> {
    let file_name = format!("{}-{}.md", item.platform.file_prefix(), item.external_id);
    let path = dir.join(&file_name);
    std::fs::write(&path, &item.markdown).map_err(|e| (item.external_id.clone(), e.to_string()))?;

    let key = SessionKey::new(
        item.user_id.unwrap_or_else(|| "imported".to_string()),
        item.agent_id.unwrap_or_else(|| "main".to_string()),
        format!("imported-{}-{}", item.platform.file_prefix(), item.external_id),
    );

    state
        .sessions
        .get_or_create_session(
            &key,
            Some("imported_markdown"),
            None,
            &state.vault_path().to_string_lossy(),
            &state.claude_home,
        )
        .map_err(|e| (item.external_id.clone(), e.to_string()))?;
    state
        .sessions
        .finalize_session(&key, &item.external_id)
        .map_err(|e| (item.external_id.clone(), e.to_string()))?;
    if let Some(title) = &item.title {
        state
            .sessions
            .set_title_if_ai_owned(&item.external_id, title)
            .map_err(|e| (item.external_id.clone(), e.to_string()))?;
    }

    Ok(ImportedSession {
        session_id: item.external_id,
        path: path.to_string_lossy().to_string(),
    })
}
