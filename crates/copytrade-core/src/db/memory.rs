//! In-memory store for tests and shadow runs.

use crate::db::{Store, TraceRecord};
use crate::types::{CooldownEntry, CopyOrder, OrderOutcome, OrderStatus, Strategy};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    strategies: HashMap<Uuid, Strategy>,
    orders: HashMap<Uuid, CopyOrder>,
    cooldowns: HashMap<Uuid, CooldownEntry>,
    tokens: HashMap<(String, String), String>,
    traces: Vec<TraceRecord>,
}

/// Store backend holding everything under one lock; the CAS and
/// mark-released contracts hold because each trait call locks once.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trace rows captured so far (test inspection).
    pub async fn trace_records(&self) -> Vec<TraceRecord> {
        self.inner.lock().await.traces.clone()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn insert_strategy(&self, strategy: &Strategy) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.strategies.insert(strategy.id, strategy.clone());
        Ok(())
    }

    async fn get_strategy(&self, id: Uuid) -> Result<Option<Strategy>> {
        let inner = self.inner.lock().await;
        Ok(inner.strategies.get(&id).cloned())
    }

    async fn list_active_strategies(&self) -> Result<Vec<Strategy>> {
        let inner = self.inner.lock().await;
        let mut strategies: Vec<Strategy> = inner
            .strategies
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect();
        strategies.sort_by_key(|s| s.created_at);
        Ok(strategies)
    }

    async fn cas_capital(
        &self,
        strategy_id: Uuid,
        expected_available: Decimal,
        new_available: Decimal,
        new_locked: Decimal,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.strategies.get_mut(&strategy_id) {
            Some(s) if s.available_cash == expected_available => {
                s.available_cash = new_available;
                s.locked_capital = new_locked;
                s.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn write_capital(
        &self,
        strategy_id: Uuid,
        available: Decimal,
        locked: Decimal,
        cooldown: Decimal,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.strategies.get_mut(&strategy_id) {
            s.available_cash = available;
            s.locked_capital = locked;
            s.cooldown_capital = cooldown;
            s.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn write_risk_counters(&self, strategy: &Strategy) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.strategies.get_mut(&strategy.id) {
            s.daily_spent = strategy.daily_spent;
            s.daily_loss = strategy.daily_loss;
            s.daily_reset_date = strategy.daily_reset_date;
            s.peak_equity = strategy.peak_equity;
            s.consecutive_losses = strategy.consecutive_losses;
            s.circuit_breaker_active = strategy.circuit_breaker_active;
            s.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_order(&self, order: &CopyOrder) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &CopyOrder) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<CopyOrder>> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn find_order_by_dedup(
        &self,
        strategy_id: Uuid,
        source_trade_id: &str,
    ) -> Result<Option<CopyOrder>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .values()
            .find(|o| o.strategy_id == strategy_id && o.source_trade_id == source_trade_id)
            .cloned())
    }

    async fn list_orders_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<CopyOrder>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<CopyOrder> = inner
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn list_open_positions(&self, strategy_id: Option<Uuid>) -> Result<Vec<CopyOrder>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<CopyOrder> = inner
            .orders
            .values()
            .filter(|o| {
                matches!(o.status, OrderStatus::Filled | OrderStatus::Partial)
                    && o.outcome_result == OrderOutcome::Open
                    && o.shares_remaining > Decimal::ZERO
                    && strategy_id.map_or(true, |id| o.strategy_id == id)
            })
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn list_orders_for_strategy(&self, strategy_id: Uuid) -> Result<Vec<CopyOrder>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<CopyOrder> = inner
            .orders
            .values()
            .filter(|o| o.strategy_id == strategy_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn insert_cooldown(&self, entry: &CooldownEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.cooldowns.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn due_cooldowns(
        &self,
        strategy_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<CooldownEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<CooldownEntry> = inner
            .cooldowns
            .values()
            .filter(|c| {
                c.strategy_id == strategy_id && c.available_at <= now && c.released_at.is_none()
            })
            .cloned()
            .collect();
        entries.sort_by_key(|c| c.available_at);
        Ok(entries)
    }

    async fn mark_cooldown_released(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.cooldowns.get_mut(&id) {
            Some(entry) if entry.released_at.is_none() => {
                entry.released_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unreleased_cooldown_total(&self, strategy_id: Uuid) -> Result<Decimal> {
        let inner = self.inner.lock().await;
        Ok(inner
            .cooldowns
            .values()
            .filter(|c| c.strategy_id == strategy_id && c.released_at.is_none())
            .map(|c| c.amount)
            .sum())
    }

    async fn get_token(&self, market_id: &str, outcome: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tokens
            .get(&(market_id.to_string(), outcome.to_string()))
            .cloned())
    }

    async fn put_token(&self, market_id: &str, outcome: &str, token_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.tokens.insert(
            (market_id.to_string(), outcome.to_string()),
            token_id.to_string(),
        );
        Ok(())
    }

    async fn insert_trace(&self, record: &TraceRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.traces.push(record.clone());
        Ok(())
    }
}
