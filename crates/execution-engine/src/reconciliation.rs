//! Capital reconciliation: rebuilds the capital buckets from order and
//! cooldown records.
//!
//! The ledger keeps the buckets correct in the common case; crashes
//! between an order write and a capital write can still leave drift.
//! Reconciliation recomputes what the buckets should be from first
//! principles and overwrites them when they disagree beyond a cent.

use copytrade_core::db::Store;
use copytrade_core::types::Strategy;
use copytrade_core::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum per-bucket disagreement before a correction is written.
const DRIFT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

pub struct CapitalReconciler {
    store: Arc<dyn Store>,
}

impl CapitalReconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reconcile every active strategy. Returns how many were corrected.
    pub async fn reconcile_all(&self) -> Result<usize> {
        let strategies = self.store.list_active_strategies().await?;
        let mut corrected = 0;
        for strategy in &strategies {
            match self.reconcile(strategy).await {
                Ok(true) => corrected += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(strategy_id = %strategy.id, error = %e, "Reconciliation failed");
                }
            }
        }
        Ok(corrected)
    }

    /// Recompute one strategy's buckets from its orders and cooldown
    /// entries; write them back when the stored values have drifted.
    pub async fn reconcile(&self, strategy: &Strategy) -> Result<bool> {
        let orders = self.store.list_orders_for_strategy(strategy.id).await?;

        let locked: Decimal = orders.iter().map(|o| o.committed_capital()).sum();
        let realized: Decimal = orders.iter().map(|o| o.realized_pnl).sum();
        let cooldown = self.store.unreleased_cooldown_total(strategy.id).await?;

        let equity = strategy.initial_capital + realized;
        let available = equity - locked - cooldown;

        let drifted = (strategy.available_cash - available).abs() > DRIFT_TOLERANCE
            || (strategy.locked_capital - locked).abs() > DRIFT_TOLERANCE
            || (strategy.cooldown_capital - cooldown).abs() > DRIFT_TOLERANCE;

        if !drifted {
            debug!(strategy_id = %strategy.id, "Capital buckets consistent");
            return Ok(false);
        }

        info!(
            strategy_id = %strategy.id,
            available_before = %strategy.available_cash,
            available_after = %available,
            locked_before = %strategy.locked_capital,
            locked_after = %locked,
            cooldown_before = %strategy.cooldown_capital,
            cooldown_after = %cooldown,
            "Correcting capital drift"
        );

        self.store
            .write_capital(strategy.id, available, locked, cooldown)
            .await?;
        Ok(true)
    }
}
