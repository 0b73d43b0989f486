//! `POST /sandbox/build` (SSE) and `POST /sandbox/default/stop`.
//!
//! Building here means pulling the configured sandbox image — the same
//! subprocess-streaming idiom `skynet_sandbox::docker::DockerSandbox`
//! itself uses for `docker run`, just applied to `docker pull` so a first-
//! run operator can watch progress instead of staring at a spinner.

use std::convert::Infallible;
use std::process::Stdio;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::sse::{Event, Sse},
    response::IntoResponse,
    Json,
};
use futures_util::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::app::AppState;
use crate::auth::check_auth;

pub async fn build_sandbox(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<serde_json::Value>)> {
    if !check_auth(&state, &headers) {
        return Err((StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"}))));
    }
    let image = state.config.sandbox.image.clone();

    let stream = async_stream::stream! {
        let mut cmd = Command::new("docker");
        cmd.args(["pull", &image]).stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                yield Ok(Event::default().data(format!("{{\"error\":\"failed to spawn docker: {e}\"}}")));
                return;
            }
        };
        let stdout = child.stdout.take().expect("piped stdout");
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            yield Ok(Event::default().data(serde_json::json!({ "line": line }).to_string()));
        }
        let status = child.wait().await;
        let ok = status.map(|s| s.success()).unwrap_or(false);
        yield Ok(Event::default().data(serde_json::json!({ "done": true, "ok": ok }).to_string()));
    };

    Ok(Sse::new(stream))
}

pub async fn stop_default(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !check_auth(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"})));
    }
    match state.sandbox.stop_workspace_container("default").await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"stopped": true}))),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": e.to_string()}))),
    }
}
