//! Structured trace logging for trade attempts.
//!
//! Every batch pass gets a run id and every signal a trace id; stage
//! logs carry both plus elapsed time. Durable rows are written
//! fire-and-forget so a slow store never blocks the pipeline.

use copytrade_core::db::{Store, TraceRecord};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Correlated logger for one trade attempt within one batch pass.
#[derive(Clone)]
pub struct TradeTracer {
    store: Arc<dyn Store>,
    run_id: Uuid,
    trace_id: Uuid,
    strategy_id: Option<Uuid>,
    started: Instant,
}

impl TradeTracer {
    /// Start a tracer for a batch pass; one per run.
    pub fn for_run(store: Arc<dyn Store>, run_id: Uuid) -> Self {
        Self {
            store,
            run_id,
            trace_id: Uuid::new_v4(),
            strategy_id: None,
            started: Instant::now(),
        }
    }

    /// Derive a per-signal tracer with a fresh trace id and clock.
    pub fn for_signal(&self, strategy_id: Uuid) -> Self {
        Self {
            store: Arc::clone(&self.store),
            run_id: self.run_id,
            trace_id: Uuid::new_v4(),
            strategy_id: Some(strategy_id),
            started: Instant::now(),
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Log a stage transition and persist it without waiting.
    pub fn stage(&self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        let elapsed_ms = self.started.elapsed().as_millis() as i64;

        info!(
            run_id = %self.run_id,
            trace_id = %self.trace_id,
            strategy_id = ?self.strategy_id,
            stage = stage,
            elapsed_ms = elapsed_ms,
            "{}",
            message
        );

        let record = TraceRecord {
            id: Uuid::new_v4(),
            run_id: self.run_id,
            trace_id: self.trace_id,
            strategy_id: self.strategy_id,
            stage: stage.to_string(),
            message,
            elapsed_ms,
            created_at: Utc::now(),
        };
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.insert_trace(&record).await {
                warn!(error = %e, "Failed to persist trace record");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copytrade_core::db::MemoryStore;

    #[tokio::test]
    async fn test_stage_persists_record() {
        let store = MemoryStore::new();
        let tracer = TradeTracer::for_run(Arc::new(store.clone()), Uuid::new_v4());
        tracer.stage("sized", "bet sized at $40");

        // Fire-and-forget write; yield until it lands.
        for _ in 0..10 {
            tokio::task::yield_now().await;
            if !store.trace_records().await.is_empty() {
                break;
            }
        }
        let records = store.trace_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage, "sized");
    }

    #[tokio::test]
    async fn test_signal_tracer_shares_run_id() {
        let store = Arc::new(MemoryStore::new());
        let run = TradeTracer::for_run(store, Uuid::new_v4());
        let signal = run.for_signal(Uuid::new_v4());
        assert_eq!(run.run_id(), signal.run_id());
        assert_ne!(run.trace_id(), signal.trace_id());
    }
}
