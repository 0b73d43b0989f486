//! `GET/POST/PUT/DELETE /workspaces[...]`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use skynet_workspaces::model::{WorkspaceConfig, WorkspaceCreate, WorkspaceUpdate};

use crate::app::AppState;
use crate::auth::check_auth;

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"})))
}

fn bad_request(err: impl ToString) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()})))
}

#[derive(Serialize)]
struct WorkspaceList {
    workspaces: Vec<WorkspaceConfig>,
}

pub async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<WorkspaceList>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let workspaces = state.workspaces.list_workspaces().map_err(bad_request)?;
    Ok(Json(WorkspaceList { workspaces }))
}

pub async fn get_workspace(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Json<WorkspaceConfig>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let ws = state.workspaces.get_workspace(&slug).map_err(bad_request)?;
    Ok(Json(ws))
}

pub async fn create_workspace(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<WorkspaceCreate>,
) -> Result<Json<WorkspaceConfig>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let ws = state.workspaces.create_workspace(req).map_err(bad_request)?;
    Ok(Json(ws))
}

pub async fn update_workspace(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(req): Json<WorkspaceUpdate>,
) -> Result<Json<WorkspaceConfig>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let ws = state.workspaces.update_workspace(&slug, req).map_err(bad_request)?;
    Ok(Json(ws))
}

pub async fn delete_workspace(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    state.workspaces.delete_workspace(&slug).map_err(bad_request)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
