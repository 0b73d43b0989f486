//! The single global post-turn worker: a FIFO queue drained by one task,
//! so analysis of turn N+1 never races analysis of turn N for the same
//! session (spec §4.6 "One worker, FIFO").
//!
//! Loop shape grounded on `skynet-scheduler::engine::SchedulerEngine::run`
//! (`tokio::select!` between a timer and a `watch` shutdown signal).
//! Error handling grounded on `skynet-hooks::engine::HookEngine::emit_after`
//! (failures are logged, never propagated to whoever queued the work).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::activity::append_activity;
use crate::analyzer::Analyzer;
use crate::sink::{ExchangeRecord, KnowledgeGraphSink};
use crate::types::{ActivityLogEntry, PostTurnTask, TaskStatus};

use skynet_sessions::SessionManager;

/// Handle used by the orchestrator to enqueue work. Cloning is cheap —
/// it's just an mpsc sender.
#[derive(Clone)]
pub struct ObserverHandle {
    tx: mpsc::Sender<PostTurnTask>,
}

impl ObserverHandle {
    /// Queue a task. Never blocks the calling turn on analysis — if the
    /// queue is full, the task is dropped and a warning logged, since a
    /// missed title/summary update is not worth stalling a turn over.
    pub fn enqueue(&self, task: PostTurnTask) {
        if self.tx.try_send(task).is_err() {
            warn!("post-turn queue full or closed — task dropped");
        }
    }
}

pub struct ObserverWorker {
    rx: mpsc::Receiver<PostTurnTask>,
    sessions: Arc<SessionManager>,
    analyzer: Analyzer,
    sink: Arc<dyn KnowledgeGraphSink>,
    vault_path: std::path::PathBuf,
    idle_wake: Duration,
}

impl ObserverWorker {
    /// Build a worker plus the handle its callers enqueue through.
    /// `queue_capacity` bounds backlog — the worker is single-threaded, so
    /// a long backlog means analysis lags turns, not that turns slow down.
    pub fn new(
        sessions: Arc<SessionManager>,
        analyzer: Analyzer,
        sink: Arc<dyn KnowledgeGraphSink>,
        vault_path: std::path::PathBuf,
        idle_wake: Duration,
        queue_capacity: usize,
    ) -> (Self, ObserverHandle) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let worker = Self { rx, sessions, analyzer, sink, vault_path, idle_wake };
        (worker, ObserverHandle { tx })
    }

    /// Drain the queue until `shutdown` broadcasts `true`. When the queue
    /// is empty, wakes every `idle_wake` purely so liveness is visible in
    /// logs — there's no periodic work to do beyond draining.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("post-turn observer worker started");
        loop {
            tokio::select! {
                task = self.rx.recv() => {
                    match task {
                        Some(task) => self.run_task(task).await,
                        None => {
                            info!("post-turn queue closed, worker exiting");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(self.idle_wake) => {
                    debug!("post-turn observer idle wake");
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("post-turn observer shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Process one task. Every failure path is caught here and logged —
    /// the worker must never panic or propagate an error out of the loop.
    async fn run_task(&mut self, mut task: PostTurnTask) {
        task.status = TaskStatus::Running;
        task.started_at = Some(chrono::Utc::now().to_rfc3339());

        let session = match self.sessions.get_by_id(&task.session_id) {
            Ok(s) => s,
            Err(e) => {
                error!(session_id = %task.session_id, error = %e, "post-turn task: session lookup failed");
                return;
            }
        };

        let result = self
            .analyzer
            .analyze(&task.user_message, &task.assistant_text, &task.tool_call_summary, !session.title_is_ai_set || session.title.is_some())
            .await;

        let analysis = match result {
            Ok(a) => a,
            Err(e) => {
                warn!(session_id = %task.session_id, error = %e, "post-turn analysis failed");
                task.status = TaskStatus::Failed;
                task.error = Some(e.to_string());
                return;
            }
        };

        if let Some(ref title) = analysis.title {
            if let Err(e) = self.sessions.set_title_if_ai_owned(&task.session_id, title) {
                warn!(session_id = %task.session_id, error = %e, "failed to set ai-owned title");
            }
        }
        if let Some(ref summary) = analysis.summary {
            if let Err(e) = self.sessions.set_summary(&task.session_id, summary) {
                warn!(session_id = %task.session_id, error = %e, "failed to set session summary");
            }
        }

        let entry = ActivityLogEntry {
            ts: chrono::Utc::now().to_rfc3339(),
            session_id: task.session_id.clone(),
            session_title: analysis.title.clone().or(session.title.clone()),
            exchange_number: task.message_count,
            summary: analysis.activity.clone(),
        };
        if let Err(e) = append_activity(&self.vault_path, &entry) {
            warn!(session_id = %task.session_id, error = %e, "failed to append activity log entry");
        }

        if !task.is_trivial_exchange() {
            let record = ExchangeRecord {
                session_id: task.session_id.clone(),
                user_message: task.user_message.clone(),
                assistant_text: task.assistant_text.clone(),
                description: analysis.exchange_description.clone().unwrap_or_else(|| analysis.activity.clone()),
                timestamp: entry.ts.clone(),
            };
            if let Err(e) = self.sink.record_exchange(record).await {
                warn!(session_id = %task.session_id, error = %e, "knowledge-graph sink rejected exchange record");
            }
        }

        task.status = TaskStatus::Completed;
        task.completed_at = Some(chrono::Utc::now().to_rfc3339());
        task.result = Some(analysis);
        debug!(task_id = %task.task_id, session_id = %task.session_id, "post-turn task completed");
    }
}
