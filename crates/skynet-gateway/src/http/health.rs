use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// `GET /health` — liveness probe plus sandbox/session/bot status.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.sessions.get_stats().unwrap_or_default();

    Json(json!({
        "status": "ok",
        "protocol": skynet_core::config::PROTOCOL_VERSION,
        "sessions": {
            "total": stats.total,
            "archived": stats.archived,
        },
        "sandbox": state.sandbox.health_info().await,
        "bots": state.bots.status(),
    }))
}
