//! The knowledge-graph write-path, as a constructor-injected collaborator
//! rather than a process-wide registry lookup (spec §9 "Registry-of-
//! singletons → explicit dependency injection").
//!
//! The knowledge-graph/journal/daily-curator modules themselves are out
//! of scope (spec §1) — this trait is the observer's entire view of
//! them: one best-effort write per non-trivial exchange.

use async_trait::async_trait;

/// A single searchable exchange record handed to whatever module indexes
/// conversation content (graph DB, full-text search, …).
#[derive(Debug, Clone)]
pub struct ExchangeRecord {
    pub session_id: String,
    pub user_message: String,
    pub assistant_text: String,
    pub description: String,
    pub timestamp: String,
}

/// Implemented by the external capability provider that indexes exchange
/// records. The observer never talks to a concrete graph DB directly.
#[async_trait]
pub trait KnowledgeGraphSink: Send + Sync {
    async fn record_exchange(&self, record: ExchangeRecord) -> Result<(), String>;
}

/// No-op sink used when no knowledge-graph module is registered — the
/// observer still runs the rest of its pipeline (activity log,
/// title/summary, bridge continuity) without one.
pub struct NullSink;

#[async_trait]
impl KnowledgeGraphSink for NullSink {
    async fn record_exchange(&self, _record: ExchangeRecord) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_always_succeeds() {
        let sink = NullSink;
        let record = ExchangeRecord {
            session_id: "s1".to_string(),
            user_message: "hi".to_string(),
            assistant_text: "hello".to_string(),
            description: "greeting".to_string(),
            timestamp: "2026-07-30T00:00:00Z".to_string(),
        };
        assert!(sink.record_exchange(record).await.is_ok());
    }
}
