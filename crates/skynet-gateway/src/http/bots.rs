//! `GET/POST /bots/config`, `POST /bots/{platform}/{start,stop,test}`,
//! and `POST /bots/pairing/{id}/{approve,deny}`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use skynet_channels::PairingStatus;

use crate::app::AppState;
use crate::auth::check_auth;
use crate::bots::BotsConfig;

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"})))
}

fn bad_request(err: impl ToString) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()})))
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<BotsConfig>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    Ok(Json(state.bots_config.lock().unwrap().clone()))
}

pub async fn save_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BotsConfig>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    req.save(state.vault_path()).map_err(bad_request)?;
    *state.bots_config.lock().unwrap() = req;
    Ok(Json(serde_json::json!({ "saved": true })))
}

pub async fn start_bot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(platform): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let cfg = state.bots_config.lock().unwrap().clone();
    match platform.as_str() {
        "telegram" => {
            let Some(telegram) = &cfg.telegram else {
                return Err(bad_request("no telegram config saved"));
            };
            let router = crate::bots::router_for(
                state.orchestrator.clone(),
                state.capabilities.clone(),
                state.pairing.clone(),
                "telegram",
            );
            state.bots.start_telegram(telegram, state.vault_path.clone(), router);
        }
        "discord" => {
            let Some(discord) = &cfg.discord else {
                return Err(bad_request("no discord config saved"));
            };
            let router = crate::bots::router_for(
                state.orchestrator.clone(),
                state.capabilities.clone(),
                state.pairing.clone(),
                "discord",
            );
            state.bots.start_discord(discord, state.vault_path.clone(), router);
        }
        "matrix" => {
            let Some(matrix) = &cfg.matrix else {
                return Err(bad_request("no matrix config saved"));
            };
            let router = crate::bots::router_for(
                state.orchestrator.clone(),
                state.capabilities.clone(),
                state.pairing.clone(),
                "matrix",
            );
            state.bots.start_matrix(matrix, router);
        }
        other => return Err(bad_request(format!("unknown platform '{other}'"))),
    }
    Ok(Json(serde_json::json!({ "started": platform })))
}

pub async fn stop_bot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(platform): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    match platform.as_str() {
        "telegram" => state.bots.stop_telegram(),
        "discord" => state.bots.stop_discord(),
        "matrix" => state.bots.stop_matrix(),
        other => return Err(bad_request(format!("unknown platform '{other}'"))),
    }
    Ok(Json(serde_json::json!({ "stopped": platform })))
}

/// A connectivity check — since none of the three connectors expose a
/// cheap standalone ping, this just reports whether a config exists and
/// whether the connector task is currently running.
pub async fn test_bot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(platform): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let cfg = state.bots_config.lock().unwrap().clone();
    let configured = match platform.as_str() {
        "telegram" => cfg.telegram.is_some(),
        "discord" => cfg.discord.is_some(),
        "matrix" => cfg.matrix.is_some(),
        other => return Err(bad_request(format!("unknown platform '{other}'"))),
    };
    let running = state.bots.status()[&platform].as_bool().unwrap_or(false);
    Ok(Json(serde_json::json!({ "configured": configured, "running": running })))
}

pub async fn list_pairing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    Ok(Json(serde_json::json!({ "requests": state.pairing.list() })))
}

pub async fn approve_pairing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let Some(request) = state.pairing.set_status(&id, PairingStatus::Approved) else {
        return Err(bad_request("no such pairing request"));
    };
    add_to_allowlist(&state, &request.platform, &request.platform_user_id).map_err(bad_request)?;
    Ok(Json(serde_json::json!({ "approved": request })))
}

pub async fn deny_pairing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let Some(request) = state.pairing.set_status(&id, PairingStatus::Denied) else {
        return Err(bad_request("no such pairing request"));
    };
    Ok(Json(serde_json::json!({ "denied": request })))
}

/// Add an approved sender to its platform's persisted allow-list and
/// restart the connector so the new entry takes effect immediately.
fn add_to_allowlist(state: &AppState, platform: &str, platform_user_id: &str) -> Result<(), String> {
    let mut cfg = state.bots_config.lock().unwrap();
    match platform {
        "telegram" => {
            let Some(telegram) = cfg.telegram.as_mut() else {
                return Err("no telegram config saved".to_string());
            };
            if !telegram.allow_users.iter().any(|u| u == platform_user_id) {
                telegram.allow_users.push(platform_user_id.to_string());
            }
            cfg.save(state.vault_path()).map_err(|e| e.to_string())?;
            state.bots.stop_telegram();
            let router = crate::bots::router_for(
                state.orchestrator.clone(),
                state.capabilities.clone(),
                state.pairing.clone(),
                "telegram",
            );
            state.bots.start_telegram(cfg.telegram.as_ref().unwrap(), state.vault_path.clone(), router);
        }
        "discord" => {
            let Some(discord) = cfg.discord.as_mut() else {
                return Err("no discord config saved".to_string());
            };
            if !discord.allow_users.iter().any(|u| u == platform_user_id) {
                discord.allow_users.push(platform_user_id.to_string());
            }
            cfg.save(state.vault_path()).map_err(|e| e.to_string())?;
            state.bots.stop_discord();
            let router = crate::bots::router_for(
                state.orchestrator.clone(),
                state.capabilities.clone(),
                state.pairing.clone(),
                "discord",
            );
            state.bots.start_discord(cfg.discord.as_ref().unwrap(), state.vault_path.clone(), router);
        }
        "matrix" => {
            let Some(matrix) = cfg.matrix.as_mut() else {
                return Err("no matrix config saved".to_string());
            };
            if !matrix.allowed_users.iter().any(|u| u == platform_user_id) {
                matrix.allowed_users.push(platform_user_id.to_string());
            }
            cfg.save(state.vault_path()).map_err(|e| e.to_string())?;
            state.bots.stop_matrix();
            let router = crate::bots::router_for(
                state.orchestrator.clone(),
                state.capabilities.clone(),
                state.pairing.clone(),
                "matrix",
            );
            state.bots.start_matrix(cfg.matrix.as_ref().unwrap(), router);
        }
        other => return Err(format!("unknown platform '{other}'")),
    }
    Ok(())
}
