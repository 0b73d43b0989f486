//! Shared per-connector runtime state (spec §3 "Connector state" /
//! §4.7 shared behavior): the router, an optional transcriber, the
//! group-history ring buffer, per-chat FIFO locks, and the init-nudge
//! counter. Telegram, Discord, and Matrix each wrap one of these
//! instead of re-deriving the bookkeeping independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::history::GroupHistory;
use crate::router::MessageRouter;
use crate::transcribe::Transcriber;

pub struct ConnectorRuntime {
    pub router: Arc<dyn MessageRouter>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub group_history: GroupHistory,
    nudge_sent: StdMutex<HashMap<String, u32>>,
    chat_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConnectorRuntime {
    pub fn new(
        router: Arc<dyn MessageRouter>,
        transcriber: Option<Arc<dyn Transcriber>>,
        group_history_size: usize,
    ) -> Self {
        Self {
            router,
            transcriber,
            group_history: GroupHistory::new(group_history_size),
            nudge_sent: StdMutex::new(HashMap::new()),
            chat_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// The per-chat mutex guaranteeing FIFO processing of rapid messages
    /// from the same external chat (spec §5 "Connector per-chat FIFO").
    pub fn chat_lock(&self, chat_key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.chat_locks.lock().unwrap();
        locks
            .entry(chat_key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Return the setup-nudge text for this chat and bump its counter:
    /// first nudge, then a reminder, then `None` forever (spec §4.7:
    /// "respond once with a setup nudge, once more with a reminder,
    /// then silently drop").
    pub fn next_nudge(&self, chat_key: &str) -> Option<&'static str> {
        let mut nudges = self.nudge_sent.lock().unwrap();
        let count = nudges.entry(chat_key.to_string()).or_insert(0);
        let text = match *count {
            0 => Some("Session created! Configure it in the app, then activate it to start chatting."),
            1 => Some("Still waiting for this session to be activated in the app."),
            _ => None,
        };
        *count += 1;
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::NullRouter;

    fn runtime() -> ConnectorRuntime {
        ConnectorRuntime::new(Arc::new(NullRouter), None, 10)
    }

    #[test]
    fn chat_lock_is_stable_per_key() {
        let rt = runtime();
        let a = rt.chat_lock("chat1");
        let b = rt.chat_lock("chat1");
        assert!(Arc::ptr_eq(&a, &b));
        let c = rt.chat_lock("chat2");
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn nudge_sequence_then_silence() {
        let rt = runtime();
        assert!(rt.next_nudge("chat1").is_some());
        assert!(rt.next_nudge("chat1").is_some());
        assert!(rt.next_nudge("chat1").is_none());
        assert!(rt.next_nudge("chat1").is_none());
    }
}
