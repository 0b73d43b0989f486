//! Docker-backed sandbox: spawns `docker run` per turn and streams its
//! JSONL stdout back to the caller.
//!
//! Generalizes the subprocess-spawning idiom `skynet-agent`'s
//! `claude_cli.rs` uses for the direct (non-sandboxed) path — piped
//! stdio, a single JSON message written to stdin then closed, stdout
//! read line-by-line — but adds the container lifecycle (image/mount/
//! resource-limit bookkeeping, dual wall-clock + per-line timeout) that a
//! bare subprocess doesn't need.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use futures_util::Stream;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::AgentSandboxConfig;
use crate::error::{Result, SandboxError};

pub const DEFAULT_SANDBOX_IMAGE: &str = "parachute-sandbox:latest";
pub const DEFAULT_MEMORY_LIMIT: &str = "512m";
pub const DEFAULT_CPU_LIMIT: &str = "1.0";

const AVAILABILITY_CACHE_TTL: Duration = Duration::from_secs(60);
const DOCKER_INFO_TIMEOUT: Duration = Duration::from_secs(5);
const IMAGE_INSPECT_TIMEOUT: Duration = Duration::from_secs(10);
const EXIT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_READLINE_TIMEOUT: Duration = Duration::from_secs(180);
const RECONCILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Label attached to every container this controller spawns, so startup
/// reconciliation can find them with `docker ps --filter label=...`.
const MANAGED_LABEL: &str = "parachute.managed=true";
/// Per-workspace label used to recognize which workspace a persistent
/// container belongs to, for reconciliation and for `stop_workspace`.
const WORKSPACE_LABEL_KEY: &str = "parachute.workspace";
/// The command baked into the sandbox image that reads one JSON message
/// from stdin and streams JSONL events to stdout. Persistent containers
/// are created with a keep-alive CMD override and this entrypoint is
/// invoked per turn via `docker exec`.
const AGENT_ENTRYPOINT: &str = "/usr/local/bin/parachute-agent-entrypoint";

pub struct DockerSandbox {
    image: String,
    memory_limit: String,
    cpu_limit: String,
    vault_path: PathBuf,
    availability_cache: StdMutex<Option<(Instant, bool)>>,
}

impl DockerSandbox {
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        Self {
            image: DEFAULT_SANDBOX_IMAGE.to_string(),
            memory_limit: DEFAULT_MEMORY_LIMIT.to_string(),
            cpu_limit: DEFAULT_CPU_LIMIT.to_string(),
            vault_path: vault_path.into(),
            availability_cache: StdMutex::new(None),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_resource_limits(mut self, memory_limit: impl Into<String>, cpu_limit: impl Into<String>) -> Self {
        self.memory_limit = memory_limit.into();
        self.cpu_limit = cpu_limit.into();
        self
    }

    /// Whether the `docker` CLI is present and the daemon responds, cached
    /// for `AVAILABILITY_CACHE_TTL` so every turn doesn't shell out twice.
    #[instrument(skip(self))]
    pub async fn is_available(&self) -> bool {
        if let Some((checked_at, available)) = *self.availability_cache.lock().unwrap() {
            if checked_at.elapsed() < AVAILABILITY_CACHE_TTL {
                return available;
            }
        }

        let available = Self::probe_docker_info().await;
        *self.availability_cache.lock().unwrap() = Some((Instant::now(), available));
        available
    }

    async fn probe_docker_info() -> bool {
        let probe = Command::new("docker").arg("info").stdout(Stdio::null()).stderr(Stdio::null()).status();
        match tokio::time::timeout(DOCKER_INFO_TIMEOUT, probe).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    }

    /// Whether the configured sandbox image is present locally.
    #[instrument(skip(self))]
    pub async fn image_exists(&self) -> bool {
        let probe = Command::new("docker")
            .args(["image", "inspect", &self.image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match tokio::time::timeout(IMAGE_INSPECT_TIMEOUT, probe).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    }

    /// Status blob for a `/health`-style endpoint.
    pub async fn health_info(&self) -> Value {
        json!({
            "dockerAvailable": self.is_available().await,
            "imageExists": self.image_exists().await,
            "image": self.image,
        })
    }

    fn ephemeral_container_name(session_id: &str) -> Result<String> {
        validate_session_id(session_id)?;
        let short: String = session_id.chars().take(8).collect();
        Ok(format!("parachute-sandbox-{short}"))
    }

    fn persistent_container_name(workspace_slug: &str) -> Result<String> {
        validate_session_id(workspace_slug)?;
        Ok(format!("parachute-env-{workspace_slug}"))
    }

    fn workspace_home_dir(&self, workspace_slug: &str) -> PathBuf {
        self.vault_path
            .join(".parachute")
            .join("sandbox")
            .join("envs")
            .join(workspace_slug)
            .join("home")
    }

    /// Discover containers this controller manages by label and return
    /// their names, so the caller can register them as already-live on
    /// process startup without re-creating them.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Vec<String> {
        let probe = Command::new("docker")
            .args([
                "ps",
                "--filter",
                &format!("label={MANAGED_LABEL}"),
                "--format",
                "{{.Names}}",
            ])
            .output();
        match tokio::time::timeout(RECONCILE_TIMEOUT, probe).await {
            Ok(Ok(output)) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            Ok(Ok(output)) => {
                warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "docker ps reconciliation failed"
                );
                Vec::new()
            }
            _ => {
                warn!("docker ps reconciliation timed out or docker unavailable");
                Vec::new()
            }
        }
    }

    /// Start the persistent container for a workspace if it isn't already
    /// running, with a keep-alive CMD override so turns can be driven into
    /// it via `docker exec`. Idempotent — a running container is left
    /// alone.
    async fn ensure_persistent_container(
        &self,
        config: &AgentSandboxConfig,
        env_file: &Path,
        caps_file: Option<&Path>,
    ) -> Result<String> {
        let slug = config
            .workspace_slug
            .as_deref()
            .expect("ensure_persistent_container requires workspace_slug");
        let name = Self::persistent_container_name(slug)?;

        let running = Command::new("docker")
            .args(["inspect", "-f", "{{.State.Running}}", &name])
            .output()
            .await;
        if let Ok(output) = running {
            if output.status.success()
                && String::from_utf8_lossy(&output.stdout).trim() == "true"
            {
                return Ok(name);
            }
        }

        let mut args = self.build_run_args(config, env_file, caps_file)?;
        args.extend(["sleep".to_string(), "infinity".to_string()]);
        let status = Command::new("docker")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !status.status.success() {
            return Err(SandboxError::NonZeroExit {
                status: status.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&status.stderr).to_string(),
            });
        }
        Ok(name)
    }

    /// Stop (but don't remove the home directory of) the persistent
    /// container for a workspace. Used both for the explicit "stop
    /// default container" action and for workspace deletion (the caller
    /// is responsible for also removing the workspace home data via
    /// [`DockerSandbox::delete_workspace_home`]).
    #[instrument(skip(self))]
    pub async fn stop_workspace_container(&self, workspace_slug: &str) -> Result<()> {
        let name = Self::persistent_container_name(workspace_slug)?;
        let status = Command::new("docker")
            .args(["rm", "-f", &name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            debug!(container = %name, "stop_workspace_container: container was not running");
        }
        Ok(())
    }

    /// Remove the per-workspace home directory on disk. Called after
    /// `stop_workspace_container` when a workspace is deleted.
    pub fn delete_workspace_home(&self, workspace_slug: &str) -> std::io::Result<()> {
        let home = self.workspace_home_dir(workspace_slug);
        if home.is_dir() {
            std::fs::remove_dir_all(home)?;
        }
        Ok(())
    }

    fn resolve_host_path(&self, path: &str) -> PathBuf {
        let stripped = strip_glob_suffix(path);
        if let Some(relative) = stripped.strip_prefix("/vault/") {
            self.vault_path.join(relative)
        } else if stripped == "/vault" {
            self.vault_path.clone()
        } else if Path::new(stripped).is_absolute() {
            PathBuf::from(stripped)
        } else {
            self.vault_path.join(stripped)
        }
    }

    fn build_mounts(&self, config: &AgentSandboxConfig) -> Vec<String> {
        let mut args = Vec::new();
        if config.allowed_paths.is_empty() {
            args.push("-v".to_string());
            args.push(format!("{}:/vault:ro", self.vault_path.display()));
            return args;
        }
        for raw in &config.allowed_paths {
            let host_path = self.resolve_host_path(raw);
            let container_path = if let Some(relative) = strip_glob_suffix(raw).strip_prefix("/vault/") {
                format!("/vault/{relative}")
            } else {
                strip_glob_suffix(raw).to_string()
            };
            args.push("-v".to_string());
            args.push(format!("{}:{}:rw", host_path.display(), container_path));
        }
        args
    }

    fn build_capability_mounts(&self, config: &AgentSandboxConfig) -> Vec<String> {
        let mut args = Vec::new();
        let mcp_json = self.vault_path.join(".mcp.json");
        if mcp_json.is_file() {
            args.push("-v".to_string());
            args.push(format!("{}:/vault/.mcp.json:ro", mcp_json.display()));
        }
        let skills_dir = self.vault_path.join(".skills");
        if skills_dir.is_dir() {
            args.push("-v".to_string());
            args.push(format!("{}:/vault/.skills:ro", skills_dir.display()));
        }
        let agents_dir = self.vault_path.join(".parachute").join("agents");
        if agents_dir.is_dir() {
            args.push("-v".to_string());
            args.push(format!(
                "{}:/vault/.parachute/agents:ro",
                agents_dir.display()
            ));
        }
        let claude_md = self.vault_path.join("CLAUDE.md");
        if claude_md.is_file() {
            args.push("-v".to_string());
            args.push(format!("{}:/vault/CLAUDE.md:ro", claude_md.display()));
        }
        for (i, dir) in config.plugin_dirs.iter().enumerate() {
            if dir.is_dir() {
                args.push("-v".to_string());
                args.push(format!(
                    "{}:/plugins/{i}:ro",
                    dir.display()
                ));
            }
        }
        args
    }

    /// Mounts specific to a persistent per-workspace container: a
    /// per-workspace home directory (read-write, created if missing) and
    /// a shared read-only tools volume common to every workspace.
    fn build_persistent_mounts(&self, workspace_slug: &str) -> std::io::Result<Vec<String>> {
        let home = self.workspace_home_dir(workspace_slug);
        std::fs::create_dir_all(&home)?;
        let mut args = vec![
            "-v".to_string(),
            format!("{}:/home/sandbox:rw", home.display()),
        ];
        let shared_tools = self
            .vault_path
            .join(".parachute")
            .join("sandbox")
            .join("tools");
        if shared_tools.is_dir() {
            args.push("-v".to_string());
            args.push(format!("{}:/tools:ro", shared_tools.display()));
        }
        Ok(args)
    }

    fn build_run_args(
        &self,
        config: &AgentSandboxConfig,
        env_file: &Path,
        caps_file: Option<&Path>,
    ) -> Result<Vec<String>> {
        let persistent = config.workspace_slug.as_deref();
        let name = match persistent {
            Some(slug) => Self::persistent_container_name(slug)?,
            None => Self::ephemeral_container_name(&config.session_id)?,
        };
        let mut args = vec!["run".to_string()];
        if persistent.is_none() {
            args.push("--rm".to_string());
        } else {
            args.push("-d".to_string());
        }
        args.push("-i".to_string());
        args.push("--name".to_string());
        args.push(name);
        args.push("--label".to_string());
        args.push(MANAGED_LABEL.to_string());
        if let Some(slug) = persistent {
            args.push("--label".to_string());
            args.push(format!("{WORKSPACE_LABEL_KEY}={slug}"));
        }
        args.push("--memory".to_string());
        args.push(self.memory_limit.clone());
        args.push("--cpus".to_string());
        args.push(self.cpu_limit.clone());
        if !config.network_enabled {
            args.push("--network".to_string());
            args.push("none".to_string());
        }
        args.extend(self.build_mounts(config));
        args.extend(self.build_capability_mounts(config));
        if let Some(slug) = persistent {
            args.extend(
                self.build_persistent_mounts(slug)
                    .map_err(SandboxError::from)?,
            );
        }
        args.push("--env-file".to_string());
        args.push(env_file.display().to_string());
        if let Some(caps) = caps_file {
            args.push("-v".to_string());
            args.push(format!("{}:/caps.json:ro", caps.display()));
        }
        args.push(self.image.clone());
        Ok(args)
    }

    /// Run one turn inside a fresh container, streaming its JSONL stdout
    /// as it's produced.
    ///
    /// Applies two timeouts: an overall wall-clock deadline
    /// (`config.timeout_seconds`) and a per-line cap of
    /// `min(remaining, 180s)`, so a single hung readline can't block past
    /// the overall deadline by much, and a well-behaved stream that's
    /// simply slow isn't killed prematurely.
    #[instrument(skip(self, message), fields(session_id = %config.session_id))]
    pub fn run_agent(
        &self,
        config: AgentSandboxConfig,
        message: Value,
    ) -> impl Stream<Item = Value> + 'static {
        let image = self.image.clone();
        let memory_limit = self.memory_limit.clone();
        let cpu_limit = self.cpu_limit.clone();
        let vault_path = self.vault_path.clone();

        async_stream::stream! {
            let sandbox = DockerSandbox {
                image,
                memory_limit,
                cpu_limit,
                vault_path,
                availability_cache: StdMutex::new(None),
            };

            let env_file = match write_env_file(&config) {
                Ok(f) => f,
                Err(e) => {
                    yield error_event(&format!("failed to prepare sandbox env: {e}"));
                    return;
                }
            };
            let caps_file = match write_capabilities_file(&config) {
                Ok(f) => f,
                Err(e) => {
                    yield error_event(&format!("failed to prepare sandbox capabilities: {e}"));
                    return;
                }
            };

            let args = if config.workspace_slug.is_some() {
                match sandbox
                    .ensure_persistent_container(&config, env_file.path(), caps_file.as_ref().map(|f| f.path()))
                    .await
                {
                    Ok(name) => vec![
                        "exec".to_string(),
                        "-i".to_string(),
                        name,
                        AGENT_ENTRYPOINT.to_string(),
                    ],
                    Err(e) => {
                        yield resume_failed_event(&format!("{e}"));
                        return;
                    }
                }
            } else {
                match sandbox.build_run_args(&config, env_file.path(), caps_file.as_ref().map(|f| f.path())) {
                    Ok(a) => a,
                    Err(e) => {
                        yield error_event(&format!("{e}"));
                        return;
                    }
                }
            };

            let mut child = match Command::new("docker")
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
            {
                Ok(c) => c,
                Err(e) => {
                    yield error_event(&format!("failed to spawn docker: {e}"));
                    return;
                }
            };

            if let Some(mut stdin) = child.stdin.take() {
                let payload = json!({ "message": message });
                let line = format!("{payload}\n");
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    warn!(error = %e, "failed writing sandbox stdin");
                }
                drop(stdin);
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
                            Err(_) => debug!(%line, "skipping non-JSON sandbox stdout line"),
                        }
                    }
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => {
                        yield error_event(&format!("sandbox stdout read error: {e}"));
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
                yield error_event(&format!(
                    "sandbox turn timed out after {}s",
                    config.timeout_seconds
                ));
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
                        "sandbox container exited with status {:?}: {}",
                        status.code(),
                        stderr_text
                    ));
                }
            }
        }
    }
}

fn error_event(message: &str) -> Value {
    json!({ "type": "error", "error": message })
}

/// Emitted when a persistent-container resume attempt fails so the
/// orchestrator can retry once with history injected as text instead of
/// surfacing this as a terminal error (three-tier fallback).
fn resume_failed_event(reason: &str) -> Value {
    json!({ "type": "resume_failed", "reason": reason })
}

fn strip_glob_suffix(path: &str) -> &str {
    for suffix in ["/**", "/*", "*"] {
        if let Some(stripped) = path.strip_suffix(suffix) {
            return stripped;
        }
    }
    path
}

/// Only `[A-Za-z0-9_-]` is allowed — this becomes part of a `docker run
/// --name`, and an unvalidated session id could otherwise inject extra
/// arguments into the command line.
fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(SandboxError::InvalidSessionId(session_id.to_string()))
    }
}

fn write_env_file(config: &AgentSandboxConfig) -> std::io::Result<tempfile::NamedTempFile> {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "PARACHUTE_SESSION_ID={}", config.session_id)?;
    writeln!(file, "PARACHUTE_AGENT_TYPE={}", config.agent_type)?;
    writeln!(file, "PARACHUTE_CWD={}", config.working_directory)?;
    if let Ok(token) = std::env::var("CLAUDE_CODE_OAUTH_TOKEN") {
        writeln!(file, "CLAUDE_CODE_OAUTH_TOKEN={token}")?;
    }
    writeln!(
        file,
        "PARACHUTE_MCP_SERVERS={}",
        config.mcp_servers.to_string()
    )?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.as_file().metadata()?.permissions();
        perms.set_mode(0o600);
        file.as_file().set_permissions(perms)?;
    }

    Ok(file)
}

fn write_capabilities_file(config: &AgentSandboxConfig) -> std::io::Result<Option<tempfile::NamedTempFile>> {
    use std::io::Write;

    if config.plugin_dirs.is_empty() && config.agents.is_empty() {
        return Ok(None);
    }

    let payload = json!({
        "plugin_dirs": config.plugin_dirs,
        "mcp_servers": config.mcp_servers,
        "agents": config.agents,
    });

    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(payload.to_string().as_bytes())?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.as_file().metadata()?.permissions();
        perms.set_mode(0o600);
        file.as_file().set_permissions(perms)?;
    }

    Ok(Some(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_glob_suffix_variants() {
        assert_eq!(strip_glob_suffix("/vault/notes/**"), "/vault/notes");
        assert_eq!(strip_glob_suffix("/vault/notes/*"), "/vault/notes");
        assert_eq!(strip_glob_suffix("/vault/notes"), "/vault/notes");
    }

    #[test]
    fn validate_session_id_rejects_shell_metacharacters() {
        assert!(validate_session_id("abc123_-DEF").is_ok());
        assert!(validate_session_id("abc; rm -rf /").is_err());
        assert!(validate_session_id("").is_err());
    }

    #[test]
    fn container_name_uses_first_eight_chars() {
        let name = DockerSandbox::ephemeral_container_name("0123456789abcdef").unwrap();
        assert_eq!(name, "parachute-sandbox-01234567");
    }

    #[test]
    fn persistent_container_name_uses_slug() {
        let name = DockerSandbox::persistent_container_name("my-workspace").unwrap();
        assert_eq!(name, "parachute-env-my-workspace");
    }

    #[test]
    fn resolve_host_path_joins_vault_relative() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = DockerSandbox::new(dir.path());
        let resolved = sandbox.resolve_host_path("/vault/notes/**");
        assert_eq!(resolved, dir.path().join("notes"));
    }

    #[test]
    fn build_mounts_falls_back_to_read_only_vault() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = DockerSandbox::new(dir.path());
        let config = AgentSandboxConfig::new("sess-1", "/vault");
        let mounts = sandbox.build_mounts(&config);
        assert!(mounts.iter().any(|a| a.ends_with(":ro")));
    }

    #[test]
    fn build_run_args_uses_persistent_name_and_detach_flag() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = DockerSandbox::new(dir.path());
        let config = AgentSandboxConfig::new("sess-1", "/vault").with_workspace("acme");
        let env_file = tempfile::NamedTempFile::new().unwrap();
        let args = sandbox
            .build_run_args(&config, env_file.path(), None)
            .unwrap();
        assert!(args.contains(&"-d".to_string()));
        assert!(args.contains(&"parachute-env-acme".to_string()));
        assert!(args.iter().any(|a| a == &format!("{WORKSPACE_LABEL_KEY}=acme")));
    }

    #[test]
    fn build_persistent_mounts_creates_home_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = DockerSandbox::new(dir.path());
        let mounts = sandbox.build_persistent_mounts("acme").unwrap();
        assert!(mounts.iter().any(|a| a.ends_with(":/home/sandbox:rw")));
        assert!(sandbox.workspace_home_dir("acme").is_dir());
    }
}
