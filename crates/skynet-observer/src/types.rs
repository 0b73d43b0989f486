//! The post-turn task record (spec §3 "Post-turn task") and the
//! structured-output shape the analyzer's model call produces.

use serde::{Deserialize, Serialize};

/// Why a task was queued — informational only, doesn't change behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTrigger {
    TurnCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One unit of post-turn analysis work, queued by the orchestrator after
/// every turn and drained FIFO by the single global worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostTurnTask {
    pub task_id: String,
    pub session_id: String,
    pub trigger: TaskTrigger,
    pub user_message: String,
    pub assistant_text: String,
    pub tool_call_summary: String,
    pub message_count: u32,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub status: TaskStatus,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
}

impl PostTurnTask {
    pub fn new(session_id: impl Into<String>, user_message: impl Into<String>, assistant_text: impl Into<String>, tool_call_summary: impl Into<String>, message_count: u32) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            trigger: TaskTrigger::TurnCompleted,
            user_message: user_message.into(),
            assistant_text: assistant_text.into(),
            tool_call_summary: tool_call_summary.into(),
            message_count,
            queued_at: chrono::Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// An exchange is trivial when both sides are extremely short — the
    /// knowledge-graph write is skipped for these (spec §4.6.3), but the
    /// task is still processed for the activity log and title/summary.
    pub fn is_trivial_exchange(&self) -> bool {
        const TRIVIAL_CHARS: usize = 12;
        self.user_message.trim().len() < TRIVIAL_CHARS && self.assistant_text.trim().len() < TRIVIAL_CHARS
    }
}

/// The structured JSON-schema-constrained output of the analyzer's single
/// per-turn model call. All fields optional except `activity` — the model
/// may have nothing new to say about the title or summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub activity: String,
    pub exchange_description: Option<String>,
}

/// One line of `Daily/.activity/<date>.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub ts: String,
    pub session_id: String,
    pub session_title: Option<String>,
    pub exchange_number: u32,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_exchange_detected_for_short_messages() {
        let task = PostTurnTask::new("s1", "hi", "hello!", "", 2);
        assert!(task.is_trivial_exchange());
    }

    #[test]
    fn non_trivial_exchange_for_longer_messages() {
        let task = PostTurnTask::new(
            "s1",
            "Can you help me plan a weekend trip to the mountains?",
            "Sure — here are a few route options depending on how much hiking you want to do.",
            "",
            2,
        );
        assert!(!task.is_trivial_exchange());
    }
}
