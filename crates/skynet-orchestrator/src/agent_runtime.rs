//! Direct (in-process, `direct`-trust) agent invocation: runs `claude -p`
//! on the host and streams its JSONL stdout back line by line.
//!
//! Generalizes `skynet_agent::claude_cli::ClaudeCliProvider` — which spawns
//! the same binary but waits for one non-streaming JSON blob — into a
//! per-line stream, using the same dual wall-clock/per-chunk-read timeout
//! idiom `skynet_sandbox::docker::DockerSandbox::run_agent` uses for the
//! sandboxed path, so both trust levels translate into the same
//! `TurnEvent` stream shape in `turn.rs`.
//!
//! Unlike a one-shot subprocess, stdin stays open for the process's whole
//! lifetime: `--input-format stream-json` lets a client feed a tool result
//! back in mid-turn, which is how `turn.rs` resolves an `AskUserQuestion`
//! rendezvous without needing the bypass-everything `--dangerously-skip-permissions`
//! flag (that flag would also stop the CLI from ever pausing on the
//! question in the first place).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures_util::Stream;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Command, ChildStdin};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A handle back into a running turn's stdin, for feeding a client-side
/// tool result (currently only `AskUserQuestion`'s answer) to the CLI
/// once it's available. Cloning shares the same underlying pipe.
#[derive(Clone)]
pub struct AgentStdin {
    tx: mpsc::UnboundedSender<String>,
}

impl AgentStdin {
    /// Write a `tool_result` input message for `tool_use_id`. Returns
    /// `false` if the turn's stdin writer has already shut down (the
    /// process exited, or the turn finished before an answer arrived) —
    /// callers should treat that as "nothing to do" rather than an error.
    pub fn send_tool_result(&self, tool_use_id: &str, content: Value, is_error: bool) -> bool {
        let line = json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                }]
            }
        })
        .to_string();
        self.tx.send(line).is_ok()
    }
}

const MAX_READLINE_TIMEOUT: Duration = Duration::from_secs(180);
const EXIT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a direct turn needs to invoke the agent runtime.
#[derive(Debug, Clone)]
pub struct DirectAgentConfig {
    pub model: String,
    pub system_prompt: String,
    /// SDK session id to resume, when this session has a resumable
    /// transcript (see `skynet_sessions::locate_transcript`).
    pub resume_id: Option<String>,
    /// Empty = no `--allowedTools` flag (all tools allowed by the CLI's
    /// own defaults).
    pub allowed_tools: Vec<String>,
    pub mcp_servers: Value,
    pub working_directory: String,
    pub timeout_seconds: u64,
}

/// Runs the `claude` CLI on the host.
pub struct AgentRuntime {
    command: String,
}

impl AgentRuntime {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Stream one turn's worth of JSONL events, plus a handle that stays
    /// live for the whole turn to feed answers back over stdin. Each
    /// yielded `Value` is passed through unchanged — `turn.rs` is
    /// responsible for mapping the CLI's native event shape to
    /// `TurnEvent`.
    pub fn run_turn(
        &self,
        config: DirectAgentConfig,
        message: String,
    ) -> (AgentStdin, impl Stream<Item = Value> + 'static) {
        let command = self.command.clone();
        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let handle = AgentStdin { tx: stdin_tx };

        let stream = async_stream::stream! {
            let sys_file = match write_temp_file("skynet-sys-", ".txt", config.system_prompt.as_bytes()) {
                Ok(f) => f,
                Err(e) => {
                    yield error_event(&format!("failed to write system prompt: {e}"));
                    return;
                }
            };

            let mcp_file = if config.mcp_servers.as_object().map(|m| !m.is_empty()).unwrap_or(false) {
                let payload = json!({ "mcpServers": config.mcp_servers });
                match write_temp_file("skynet-mcp-", ".json", payload.to_string().as_bytes()) {
                    Ok(f) => Some(f),
                    Err(e) => {
                        yield error_event(&format!("failed to write mcp config: {e}"));
                        return;
                    }
                }
            } else {
                None
            };

            let mut cmd = Command::new(&command);
            cmd.current_dir(&config.working_directory)
                .arg("-p")
                .arg("--output-format")
                .arg("stream-json")
                .arg("--verbose")
                .arg("--model")
                .arg(&config.model)
                .arg("--system-prompt-file")
                .arg(&sys_file);

            if let Some(resume_id) = &config.resume_id {
                cmd.arg("--resume").arg(resume_id);
            }

            if !config.allowed_tools.is_empty() {
                if config.allowed_tools.len() == 1 && config.allowed_tools[0] == "*" {
                    // Trust this session's file edits without an interactive
                    // prompt, but stay on the normal permission path — unlike
                    // `--dangerously-skip-permissions`, this still pauses on
                    // a client-executed tool such as `AskUserQuestion` and
                    // waits for its result on stdin instead of skipping it.
                    cmd.arg("--permission-mode").arg("acceptEdits");
                } else {
                    for tool in &config.allowed_tools {
                        cmd.arg("--allowedTools").arg(tool);
                    }
                }
            }

            if let Some(mcp_file) = &mcp_file {
                cmd.arg("--mcp-config").arg(mcp_file);
            }

            cmd.arg("--input-format").arg("stream-json");

            cmd.stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped());

            let mut child = match cmd.spawn() {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    yield error_event(&format!(
                        "claude CLI not found at '{command}' — install Claude Code first"
                    ));
                    return;
                }
                Err(e) => {
                    yield error_event(&format!("failed to spawn claude CLI: {e}"));
                    return;
                }
            };

            if let Some(mut stdin) = child.stdin.take() {
                let initial_line = json!({
                    "type": "user",
                    "message": { "role": "user", "content": [{ "type": "text", "text": message }] }
                })
                .to_string();
                if let Err(e) = stdin.write_all(initial_line.as_bytes()).await {
                    warn!(error = %e, "failed writing agent stdin");
                }
                let _ = stdin.write_all(b"\n").await;
                let _ = stdin.flush().await;
                tokio::spawn(forward_stdin(stdin, stdin_rx));
            }

            let stdout = child.stdout.take().expect("piped stdout");
            let mut reader = BufReader::new(stdout).lines();

            let deadline = Instant::now() + Duration::from_secs(config.timeout_seconds);
            let mut timed_out = false;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    timed_out = true;
                    break;
                }
                let chunk_timeout = remaining.min(MAX_READLINE_TIMEOUT);

                match tokio::time::timeout(chunk_timeout, reader.next_line()).await {
                    Ok(Ok(Some(line))) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Value>(&line) {
                            Ok(event) => yield event,
                            Err(_) => debug!(%line, "skipping non-JSON agent stdout line"),
                        }
                    }
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => {
                        yield error_event(&format!("agent stdout read error: {e}"));
                        break;
                    }
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                }
            }

            if timed_out {
                let _ = child.start_kill();
                yield error_event(&format!("turn timed out after {}s", config.timeout_seconds));
                return;
            }

            let exit = match tokio::time::timeout(EXIT_WAIT_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => Some(status),
                Ok(Err(_)) => None,
                Err(_) => {
                    let _ = child.start_kill();
                    None
                }
            };

            if let Some(status) = exit {
                if !status.success() {
                    let mut stderr_text = String::new();
                    if let Some(mut stderr) = child.stderr.take() {
                        use tokio::io::AsyncReadExt;
                        let _ = stderr.read_to_string(&mut stderr_text).await;
                    }
                    yield error_event(&format!(
                        "claude CLI exited with status {:?}: {stderr_text}",
                        status.code()
                    ));
                }
            }
        };

        (handle, stream)
    }
}

/// Owns the child's stdin for the turn's lifetime, writing each queued
/// line (plus a trailing newline) as it arrives. Exits once the sender
/// half (`AgentStdin`) is dropped or a write fails, e.g. because the
/// process already exited.
async fn forward_stdin(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stdin.write_all(b"\n").await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

fn error_event(message: &str) -> Value {
    json!({ "type": "error", "error": message })
}

fn write_temp_file(prefix: &str, suffix: &str, contents: impl AsRef<[u8]>) -> std::io::Result<PathBuf> {
    let file = tempfile::Builder::new().prefix(prefix).suffix(suffix).tempfile()?;
    std::fs::write(file.path(), contents)?;
    // keep_ok: persist so the path outlives this function; the OS temp
    // directory reaps it eventually and a turn's lifetime is short.
    let (_, path) = file.keep()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_temp_file_round_trips_contents() {
        let path = write_temp_file("skynet-test-", ".txt", b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn error_event_shape() {
        let event = error_event("boom");
        assert_eq!(event["type"], "error");
        assert_eq!(event["error"], "boom");
    }
}
