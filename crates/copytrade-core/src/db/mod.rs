//! Durable store for strategies, orders, cooldown entries and trace logs.
//!
//! All ledger and order state flows through the [`Store`] trait so that the
//! engine can run against PostgreSQL in production ([`PgStore`]) and an
//! in-memory backend in tests ([`MemoryStore`]). The capital CAS contract
//! lives here: `cas_capital` must atomically compare `available_cash`
//! against the caller's expected value and only then write.

pub mod memory;
pub mod postgres;

use crate::types::{CooldownEntry, CopyOrder, OrderStatus, Strategy};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One structured execution-log row, written fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: Uuid,
    /// One id per batch pass.
    pub run_id: Uuid,
    /// One id per trade signal.
    pub trace_id: Uuid,
    pub strategy_id: Option<Uuid>,
    pub stage: String,
    pub message: String,
    pub elapsed_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Durable storage operations used by the execution pipeline.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // Strategies
    async fn insert_strategy(&self, strategy: &Strategy) -> Result<()>;
    async fn get_strategy(&self, id: Uuid) -> Result<Option<Strategy>>;
    async fn list_active_strategies(&self) -> Result<Vec<Strategy>>;

    /// Compare-and-swap the capital buckets: the write only happens when
    /// `available_cash` still equals `expected_available`. Returns whether
    /// the swap was applied.
    async fn cas_capital(
        &self,
        strategy_id: Uuid,
        expected_available: Decimal,
        new_available: Decimal,
        new_locked: Decimal,
    ) -> Result<bool>;

    /// Unconditional capital write (unlock, release, reconciliation).
    async fn write_capital(
        &self,
        strategy_id: Uuid,
        available: Decimal,
        locked: Decimal,
        cooldown: Decimal,
    ) -> Result<()>;

    /// Persist the risk counters and circuit-breaker flag of a strategy.
    async fn write_risk_counters(&self, strategy: &Strategy) -> Result<()>;

    // Orders
    async fn insert_order(&self, order: &CopyOrder) -> Result<()>;
    async fn update_order(&self, order: &CopyOrder) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<CopyOrder>>;
    async fn find_order_by_dedup(
        &self,
        strategy_id: Uuid,
        source_trade_id: &str,
    ) -> Result<Option<CopyOrder>>;
    async fn list_orders_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<CopyOrder>>;
    /// Filled/partial orders with an open outcome and shares remaining.
    async fn list_open_positions(&self, strategy_id: Option<Uuid>) -> Result<Vec<CopyOrder>>;
    async fn list_orders_for_strategy(&self, strategy_id: Uuid) -> Result<Vec<CopyOrder>>;

    // Cooldown entries
    async fn insert_cooldown(&self, entry: &CooldownEntry) -> Result<()>;
    async fn due_cooldowns(
        &self,
        strategy_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<CooldownEntry>>;
    /// Mark an entry released; returns false when it was already released.
    /// The drain relies on this being atomic per entry.
    async fn mark_cooldown_released(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;
    async fn unreleased_cooldown_total(&self, strategy_id: Uuid) -> Result<Decimal>;

    // Instrument cache (durable tier)
    async fn get_token(&self, market_id: &str, outcome: &str) -> Result<Option<String>>;
    async fn put_token(&self, market_id: &str, outcome: &str, token_id: &str) -> Result<()>;

    // Trace logs
    async fn insert_trace(&self, record: &TraceRecord) -> Result<()>;
}

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &crate::config::DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Run database migrations from the migrations directory.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate::Migrator::new(Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    Ok(())
}
