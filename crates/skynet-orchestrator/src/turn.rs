//! The eleven-phase turn pipeline.
//!
//! `Orchestrator::run_turn` composes every phase into a single
//! normalized [`TurnEvent`] stream:
//!
//!  1. resolve the workspace (if any) and its capability/trust policy
//!  2. resolve (or create) the session — split into a read-only peek
//!     before phases 3-4 (trust/cwd may fall back to an existing row)
//!     and the authoritative, transcript-aware lookup right after
//!  3. resolve the effective trust level, honoring the workspace ceiling
//!  4. resolve the working directory, with transcript-location fallback
//!  5. locate and, if needed, reconstruct the prior transcript
//!  6. filter capabilities down to what this turn's trust level may see
//!  7. build the system prompt
//!  8. emit pre-turn metadata (`session`, `prompt_metadata`, `user_message`)
//!  9. dispatch to the direct runtime or the sandbox controller
//! 10. map raw runtime events to normalized ones, gating tool use against
//!     trust policy and routing `AskUserQuestion` through the permission
//!     broker
//! 11. finalize the session and emit `done`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures_util::{pin_mut, Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use skynet_capabilities::filter::{
    filter_by_trust_level, filter_capabilities, filter_plugin_dirs, FilteredCapabilities,
    McpDescriptor, PluginDirSource, WorkspaceCapabilityPolicy,
};
use skynet_capabilities::trust::TrustLevel;
use skynet_observer::{ObserverHandle, PostTurnTask};
use skynet_permissions::{PermissionBroker, QuestionAnswer, ToolDecision, ToolTrustPolicy};
use skynet_sandbox::{AgentSandboxConfig, DockerSandbox};
use skynet_sessions::transcript::{locate_transcript, reconstruct_messages};
use skynet_sessions::{SessionKey, SessionManager, SessionSource};
use skynet_workspaces::WorkspaceStore;

use crate::agent_runtime::{AgentRuntime, AgentStdin, DirectAgentConfig};
use crate::error::{OrchestratorError, Result};
use crate::events::TurnEvent;
use crate::mapper::EventMapper;
use crate::systemprompt::{build_system_prompt, ContextFile, SystemPromptSource};
use crate::trust::resolve_effective_trust;
use crate::workdir::{apply_transcript_cwd_override, resolve_working_directory};

/// The AskUserQuestion tool's name in the agent runtime's own vocabulary.
/// A turn never executes it; it's always intercepted and routed to the
/// permission broker instead.
const ASK_USER_QUESTION_TOOL: &str = "AskUserQuestion";

/// One turn's worth of caller-supplied input.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub user_id: String,
    pub agent_id: String,
    pub session_name: String,
    pub message: String,
    /// Trust level the client explicitly asked for, if any.
    pub client_trust: Option<String>,
    pub workspace_slug: Option<String>,
    pub working_directory_override: Option<String>,
    pub agent_type: String,
    pub source: SessionSource,
    pub model: String,
    pub timeout_seconds: u64,
}

/// Everything discovered on the vault that a turn's capability filter
/// needs, gathered once per process rather than per turn.
#[derive(Debug, Clone, Default)]
pub struct CapabilityBundle {
    pub all_mcps: Vec<McpDescriptor>,
    pub all_skills: Vec<String>,
    pub all_agents: Vec<String>,
    pub discovered_plugin_dirs: Vec<PluginDirSource>,
    pub claude_md: Option<String>,
    pub context_files: Vec<(String, String)>,
}

pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    workspaces: Arc<WorkspaceStore>,
    sandbox: Arc<DockerSandbox>,
    broker: Arc<PermissionBroker>,
    agent_runtime: Arc<AgentRuntime>,
    tool_policy: ToolTrustPolicy,
    vault_path: String,
    claude_home: PathBuf,
    observer: Option<Arc<ObserverHandle>>,
    /// Live turns, keyed by `SessionKey::format()` — known to a caller
    /// before `run_turn` returns its first event, unlike the session's
    /// own id, which is the shared `"pending"` placeholder until phase
    /// 11 finalizes it. Backs `/chat/abort/{sid}`.
    interrupts: DashMap<String, CancellationToken>,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        workspaces: Arc<WorkspaceStore>,
        sandbox: Arc<DockerSandbox>,
        broker: Arc<PermissionBroker>,
        agent_runtime: Arc<AgentRuntime>,
        tool_policy: ToolTrustPolicy,
        vault_path: impl Into<String>,
        claude_home: impl Into<PathBuf>,
        observer: Option<Arc<ObserverHandle>>,
    ) -> Self {
        Self {
            sessions,
            workspaces,
            sandbox,
            broker,
            agent_runtime,
            tool_policy,
            vault_path: vault_path.into(),
            claude_home: claude_home.into(),
            observer,
            interrupts: DashMap::new(),
        }
    }

    /// Cancel a live turn by its session key (`SessionKey::format()`).
    /// Returns `true` if a matching turn was found and signalled; the
    /// turn itself observes the cancellation at its next suspension
    /// point and yields `Aborted` rather than stopping immediately.
    pub fn abort(&self, sid: &str) -> bool {
        if let Some(token) = self.interrupts.get(sid) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Run one turn end to end, yielding normalized events as they
    /// become available. Never panics; every failure path yields a
    /// terminal event (`error`, `typed_error`, `session_unavailable`, or
    /// `resume_failed`) rather than dropping the stream silently.
    pub fn run_turn(
        self: &Arc<Self>,
        input: TurnInput,
        capabilities: CapabilityBundle,
    ) -> impl Stream<Item = TurnEvent> + 'static {
        let this = Arc::clone(self);
        let turn_started = Instant::now();
        async_stream::stream! {
            // Phase 1: workspace + capability policy.
            let workspace = match &input.workspace_slug {
                Some(slug) => match this.workspaces.get_workspace(slug) {
                    Ok(w) => Some(w),
                    Err(e) => {
                        yield TurnEvent::TypedError {
                            code: "workspace_not_found".to_string(),
                            message: e.to_string(),
                        };
                        return;
                    }
                },
                None => None,
            };
            let workspace_default_trust = workspace
                .as_ref()
                .map(|w| w.default_trust_level)
                .unwrap_or(TrustLevel::Sandboxed);
            let capability_policy: WorkspaceCapabilityPolicy = workspace
                .as_ref()
                .map(|w| w.capabilities.clone())
                .unwrap_or_default();

            // Phase 2 (part 1): peek at any existing row for this key,
            // read-only, so trust and cwd below can fall back to what it
            // already recorded — the authoritative lookup in phase 2
            // (part 2) needs that resolved cwd to check transcript
            // existence, so it can't run first.
            let key = SessionKey {
                user_id: input.user_id.clone(),
                agent_id: input.agent_id.clone(),
                name: input.session_name.clone(),
            };
            let existing = match this.sessions.get(&key) {
                Ok(v) => v,
                Err(e) => {
                    yield TurnEvent::TypedError { code: "session_store_error".to_string(), message: e.to_string() };
                    return;
                }
            };

            // Phase 3: trust.
            let effective_trust = match resolve_effective_trust(
                input.client_trust.as_deref(),
                existing.as_ref().and_then(|s| s.trust_level.as_deref()),
                workspace_default_trust,
            ) {
                Ok(t) => t,
                Err(e) => {
                    yield TurnEvent::TypedError { code: "trust_escalation_denied".to_string(), message: e.to_string() };
                    return;
                }
            };

            // Phase 4: working directory.
            let resolved_cwd = resolve_working_directory(
                input.working_directory_override.as_deref(),
                workspace.as_ref().map(|w| w.working_directory.as_str()),
                existing.as_ref().and_then(|s| s.working_directory.as_deref()),
                &this.vault_path,
            );

            // Phase 2 (part 2): the authoritative session lookup, now
            // that the resolved cwd is known — checks transcript
            // existence before deciding `resume_id` (spec's four
            // resume-decision branches), rather than trusting a stored
            // row's id unconditionally.
            let (session, resume_info, is_new) = match this.sessions.get_or_create_session(
                &key,
                Some(input.source.as_str()),
                input.workspace_slug.as_deref(),
                &resolved_cwd,
                &this.claude_home,
            ) {
                Ok(v) => v,
                Err(e) => {
                    yield TurnEvent::TypedError { code: "session_store_error".to_string(), message: e.to_string() };
                    return;
                }
            };
            let denial_key = session.id.clone();
            let interrupt_key = key.format();
            let cancel_token = CancellationToken::new();
            this.interrupts.insert(interrupt_key.clone(), cancel_token.clone());

            // Phase 5: transcript location + reconstruction.
            let mut cwd = resolved_cwd.clone();
            let mut prior_conversation = None;
            if let Some(resume_id) = resume_info.resume_id.as_deref() {
                if let Some((path, _root)) =
                    locate_transcript(&this.claude_home, Path::new(&this.vault_path), &resolved_cwd, resume_id)
                {
                    if let Some(parent) = path.parent().and_then(|p| p.to_str()) {
                        cwd = apply_transcript_cwd_override(cwd, Some(parent));
                    }
                    if !input.source.is_sdk_resumable() {
                        if let Ok(messages) = reconstruct_messages(&path) {
                            let rendered = messages
                                .iter()
                                .map(|m| format!("{}: {}", m.role, m.content))
                                .collect::<Vec<_>>()
                                .join("\n");
                            prior_conversation = Some(rendered);
                        }
                    }
                }
            }

            // Phase 6: capability filtering.
            let trust_filtered = filter_by_trust_level(&capabilities.all_mcps, effective_trust);
            let plugin_dirs = filter_plugin_dirs(&capability_policy, &capabilities.discovered_plugin_dirs);
            let filtered: FilteredCapabilities = filter_capabilities(
                &capability_policy,
                &trust_filtered,
                &capabilities.all_skills,
                &capabilities.all_agents,
                &plugin_dirs,
            );

            // Phase 7: system prompt.
            let context_files: Vec<ContextFile<'_>> = capabilities
                .context_files
                .iter()
                .map(|(name, content)| ContextFile { name, content })
                .collect();
            let system_prompt = build_system_prompt(
                SystemPromptSource::Fragment,
                &cwd,
                capabilities.claude_md.as_deref(),
                &context_files,
                prior_conversation.as_deref(),
            );

            // Phase 8: pre-turn metadata.
            yield TurnEvent::Session {
                session_id: if is_new { None } else { Some(session.id.clone()) },
            };
            yield TurnEvent::PromptMetadata {
                trust_level: effective_trust.as_str().to_string(),
                working_directory: cwd.clone(),
                mcp_servers: filtered.mcp_servers.iter().map(|m| m.name.clone()).collect(),
                skills: filtered.skills.clone(),
                agents: filtered.agents.clone(),
            };
            yield TurnEvent::UserMessage { content: input.message.clone() };

            // Phase 9: dispatch.
            let mcp_servers_json = mcp_config_value(&filtered.mcp_servers);
            let mut mapper = EventMapper::new();

            if effective_trust == TrustLevel::Direct {
                let config = DirectAgentConfig {
                    model: input.model.clone(),
                    system_prompt,
                    resume_id: resume_info.resume_id.clone(),
                    allowed_tools: vec!["*".to_string()],
                    mcp_servers: mcp_servers_json,
                    working_directory: cwd.clone(),
                    timeout_seconds: input.timeout_seconds,
                };
                let (agent_stdin, raw_stream) = this.agent_runtime.run_turn(config, input.message.clone());
                pin_mut!(raw_stream);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel_token.cancelled() => {
                            yield this.abort_turn(&mapper, &key, &denial_key, &session.id, is_new, &interrupt_key).await;
                            return;
                        }
                        next = raw_stream.next() => {
                            let Some(raw) = next else { break };
                            for event in this.apply_tool_gate(&mut mapper, &raw, effective_trust, &denial_key, Some(&agent_stdin)) {
                                let terminal = event.is_terminal();
                                yield event;
                                if terminal {
                                    this.interrupts.remove(&interrupt_key);
                                    this.finish(&key, &denial_key, &session.id, mapper.session_id(), is_new).await;
                                    return;
                                }
                            }
                        }
                    }
                }
            } else {
                if !this.sandbox.is_available().await {
                    this.interrupts.remove(&interrupt_key);
                    yield TurnEvent::SessionUnavailable { reason: "sandbox runtime is not available".to_string() };
                    return;
                }

                // Three-tier resume fallback (spec §4.5 phase 8 / §9 open
                // question #1): tier 1 resumes the workspace's persistent
                // container directly; on `resume_failed` tier 2 retries
                // once against a fresh ephemeral container with prior
                // conversation injected into the message text; if that
                // also fails, tier 3 retries fresh with no history at all.
                // Never a fourth tier — the source has exactly three.
                let base_config = {
                    let mut c = AgentSandboxConfig::new(session.id.clone(), cwd.clone());
                    c.agent_type = input.agent_type.clone();
                    c.allowed_paths = vec![cwd.clone()];
                    c.timeout_seconds = input.timeout_seconds;
                    c.plugin_dirs = filtered.plugin_dirs.clone();
                    c.mcp_servers = mcp_config_value(&filtered.mcp_servers);
                    c.agents = filtered.agents.clone();
                    c
                };

                for tier in 0..3u8 {
                    let mut sandbox_config = base_config.clone();
                    let message_payload = match tier {
                        0 => {
                            if let Some(slug) = &input.workspace_slug {
                                sandbox_config = sandbox_config.with_workspace(slug.clone());
                            }
                            serde_json::json!({ "text": input.message, "system_prompt": system_prompt })
                        }
                        1 => {
                            // Tier 2: ephemeral container, history folded
                            // into the message text instead of relying on
                            // the container's own resume state.
                            let injected = match &prior_conversation {
                                Some(history) => format!(
                                    "<prior_conversation>\n{history}\n</prior_conversation>\n\n{}",
                                    input.message
                                ),
                                None => input.message.clone(),
                            };
                            serde_json::json!({ "text": injected, "system_prompt": system_prompt })
                        }
                        _ => {
                            // Tier 3: fresh, no workspace binding, no
                            // injected history — the last resort.
                            serde_json::json!({ "text": input.message, "system_prompt": system_prompt })
                        }
                    };

                    let raw_stream = this.sandbox.run_agent(sandbox_config, message_payload);
                    pin_mut!(raw_stream);
                    let mut resume_failed_this_tier = false;
                    let mut aborted = false;
                    loop {
                        tokio::select! {
                            biased;
                            _ = cancel_token.cancelled() => {
                                yield this.abort_turn(&mapper, &key, &denial_key, &session.id, is_new, &interrupt_key).await;
                                aborted = true;
                                break;
                            }
                            next = raw_stream.next() => {
                                let Some(raw) = next else { break };
                                let events = this.apply_tool_gate(&mut mapper, &raw, effective_trust, &denial_key, None);
                                let saw_resume_failed = events.iter().any(|e| matches!(e, TurnEvent::ResumeFailed { .. }));
                                for event in events {
                                    let terminal = event.is_terminal();
                                    yield event;
                                    if terminal {
                                        this.interrupts.remove(&interrupt_key);
                                        this.finish(&key, &denial_key, &session.id, mapper.session_id(), is_new).await;
                                        return;
                                    }
                                }
                                if saw_resume_failed {
                                    resume_failed_this_tier = true;
                                }
                            }
                        }
                    }
                    if aborted {
                        return;
                    }
                    if !resume_failed_this_tier {
                        // The stream ended cleanly without a terminal
                        // event (e.g. the container exited silently) —
                        // don't retry, fall through to the final-event
                        // safety net below.
                        break;
                    }
                    // Otherwise the stream ended right after a
                    // `resume_failed`; loop to the next tier unless this
                    // was already the last one.
                }
            }

            // The runtime stream ended without ever yielding a terminal
            // event (e.g. the process exited silently) — still finalize
            // so the session isn't left pointing at `"pending"` forever.
            for event in this.complete_turn(&mapper, &key, &denial_key, &session.id, is_new, &input, turn_started, &interrupt_key).await {
                yield event;
            }
        }
    }

    /// Phase 10: gate each raw event through the trust policy and the
    /// `AskUserQuestion` rendezvous before handing it to the mapper's
    /// normal translation.
    ///
    /// Gating happens after the fact rather than by restricting the
    /// runtime's own tool list up front, since the trust policy is
    /// keyed by tool name and the runtime process has already decided
    /// to invoke it by the time this sees the event; a denied tool use
    /// is reported back as a synthetic error result instead of being
    /// forwarded, and is never actually run.
    ///
    /// `agent_stdin` is `Some` only for the direct-trust path, which is
    /// the only runtime that keeps its stdin open for mid-turn input; an
    /// `AskUserQuestion` on the sandboxed path still registers with the
    /// broker so `/chat/pending/{sid}` and `/chat/answer/{request_id}`
    /// work, it just has nowhere to deliver the answer back into the
    /// running container turn.
    fn apply_tool_gate(
        &self,
        mapper: &mut EventMapper,
        raw: &Value,
        trust: TrustLevel,
        denial_key: &str,
        agent_stdin: Option<&AgentStdin>,
    ) -> Vec<TurnEvent> {
        let mapped = mapper.map(raw);
        let mut out = Vec::with_capacity(mapped.len());
        for event in mapped {
            match event {
                TurnEvent::ToolUse { tool_use_id, name, input } if name == ASK_USER_QUESTION_TOOL => {
                    let (request_id, rx) = self.broker.on_user_question(denial_key, &tool_use_id, input.clone());
                    if let Some(stdin) = agent_stdin.cloned() {
                        let waiting_tool_use_id = tool_use_id.clone();
                        tokio::spawn(async move {
                            let Ok(answer) = rx.await else {
                                // Turn ended (or the session was cleared)
                                // before a client answered; nothing to
                                // deliver.
                                return;
                            };
                            let (content, is_error) = match classify_answer(answer) {
                                Ok(value) => (value, false),
                                Err(e) => (serde_json::json!({ "error": e.to_string() }), true),
                            };
                            stdin.send_tool_result(&waiting_tool_use_id, content, is_error);
                        });
                    }
                    out.push(TurnEvent::UserQuestion { request_id, question: input });
                }
                TurnEvent::ToolUse { tool_use_id, name, input } => {
                    match self.tool_policy.evaluate(trust, &name) {
                        ToolDecision::Allow => out.push(TurnEvent::ToolUse { tool_use_id, name, input }),
                        ToolDecision::Deny { reason } => {
                            self.broker.on_denial(denial_key, &name, &reason);
                            out.push(TurnEvent::ToolResult {
                                tool_use_id,
                                content: serde_json::json!({ "error": reason }),
                                is_error: true,
                            });
                        }
                    }
                }
                other => out.push(other),
            }
        }
        out
    }

    /// Phase 11: finalize the session id, update its message count, and
    /// drop any leftover denial/question bookkeeping for this turn.
    async fn finish(
        &self,
        key: &SessionKey,
        denial_key: &str,
        fallback_id: &str,
        runtime_session_id: Option<&str>,
        is_new: bool,
    ) -> String {
        let real_id = runtime_session_id.unwrap_or(fallback_id).to_string();
        if is_new {
            if let Err(e) = self.sessions.finalize_session(key, &real_id) {
                tracing::warn!(error = %e, "failed to finalize session id");
            }
        }
        if let Err(e) = self.sessions.increment_message_count(&real_id, 2) {
            tracing::warn!(error = %e, "failed to update message count");
        }
        self.broker.clear_session(denial_key);
        real_id
    }

    /// Normal completion path: run phase 11's bookkeeping, queue the
    /// post-turn observer task, and return the `session` (only if the
    /// session started out pending) and `done` events to yield.
    async fn complete_turn(
        &self,
        mapper: &EventMapper,
        key: &SessionKey,
        denial_key: &str,
        fallback_id: &str,
        is_new: bool,
        input: &TurnInput,
        turn_started: Instant,
        interrupt_key: &str,
    ) -> Vec<TurnEvent> {
        let real_id = self.finish(key, denial_key, fallback_id, mapper.session_id(), is_new).await;
        self.interrupts.remove(interrupt_key);

        let message_count = self
            .sessions
            .get_by_id(&real_id)
            .map(|s| s.message_count)
            .unwrap_or(0);
        let response = mapper.final_response().to_string();
        let tool_calls = mapper.tool_calls();
        let tool_call_summary = tool_calls.join(", ");

        if let Some(observer) = &self.observer {
            observer.enqueue(PostTurnTask::new(
                real_id.clone(),
                input.message.clone(),
                response.clone(),
                tool_call_summary,
                message_count,
            ));
        }

        let mut events = Vec::with_capacity(2);
        if is_new {
            events.push(TurnEvent::Session { session_id: Some(real_id.clone()) });
        }
        events.push(TurnEvent::Done {
            response,
            session_id: real_id,
            message_count,
            model: mapper.model().unwrap_or(&input.model).to_string(),
            duration_ms: turn_started.elapsed().as_millis() as u64,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls.to_vec()) },
            permission_denials: self.broker.denial_count(denial_key),
        });
        events
    }

    /// Cancellation path: same phase-11 bookkeeping as normal completion,
    /// but yields `Aborted` with whatever assistant text had accumulated
    /// instead of `Done`.
    async fn abort_turn(
        &self,
        mapper: &EventMapper,
        key: &SessionKey,
        denial_key: &str,
        fallback_id: &str,
        is_new: bool,
        interrupt_key: &str,
    ) -> TurnEvent {
        let real_id = self.finish(key, denial_key, fallback_id, mapper.session_id(), is_new).await;
        self.interrupts.remove(interrupt_key);
        let partial = mapper.final_response();
        TurnEvent::Aborted {
            message: "turn aborted".to_string(),
            session_id: real_id,
            partial_response: if partial.is_empty() { None } else { Some(partial.to_string()) },
        }
    }
}

/// Build the `--mcp-config`-shaped JSON value the runtime expects from
/// the filtered descriptor list.
fn mcp_config_value(mcps: &[McpDescriptor]) -> Value {
    let mut servers = serde_json::Map::new();
    for mcp in mcps {
        servers.insert(mcp.name.clone(), Value::Object(Default::default()));
    }
    if servers.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::json!({ "mcpServers": servers })
    }
}

/// Turn a resolved `AskUserQuestion` answer into the `tool_result`
/// content (or error) `apply_tool_gate` feeds back to the agent runtime
/// once a client has answered via `grant_permission`/`deny_permission`.
pub fn classify_answer(answer: QuestionAnswer) -> Result<Value> {
    match answer {
        QuestionAnswer::Answered(value) => Ok(value),
        QuestionAnswer::Denied => Err(OrchestratorError::AgentUnavailable(
            "user question denied".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_config_value_empty_for_no_servers() {
        let v = mcp_config_value(&[]);
        assert_eq!(v, serde_json::json!({}));
    }

    #[test]
    fn mcp_config_value_lists_server_names() {
        let mcps = vec![McpDescriptor { name: "github".to_string(), trust_level: None }];
        let v = mcp_config_value(&mcps);
        assert!(v["mcpServers"].get("github").is_some());
    }

    #[test]
    fn classify_answer_maps_denied_to_error() {
        assert!(classify_answer(QuestionAnswer::Denied).is_err());
        assert!(classify_answer(QuestionAnswer::Answered(serde_json::json!("yes"))).is_ok());
    }
}
