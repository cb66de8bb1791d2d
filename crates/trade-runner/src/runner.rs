//! Scheduled batch passes over all active strategies.

use crate::signals::SignalSource;
use chrono::{DateTime, Utc};
use copytrade_core::config::Config;
use copytrade_core::db::Store;
use copytrade_core::Result;
use execution_engine::{
    CapitalLedger, CapitalReconciler, ExecutionResult, OrderSynchronizer, SellManager,
    TradeExecutor, TradeTracer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct Runner {
    store: Arc<dyn Store>,
    executor: TradeExecutor,
    sell_manager: SellManager,
    synchronizer: OrderSynchronizer,
    reconciler: CapitalReconciler,
    ledger: CapitalLedger,
    source: Arc<dyn SignalSource>,
    config: Config,
    /// Lower bound of the signal window for the next execute pass.
    last_execute: Mutex<DateTime<Utc>>,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        executor: TradeExecutor,
        sell_manager: SellManager,
        synchronizer: OrderSynchronizer,
        reconciler: CapitalReconciler,
        source: Arc<dyn SignalSource>,
        config: Config,
    ) -> Self {
        Self {
            ledger: CapitalLedger::new(Arc::clone(&store)),
            store,
            executor,
            sell_manager,
            synchronizer,
            reconciler,
            source,
            config,
            last_execute: Mutex::new(Utc::now()),
        }
    }

    /// Run forever on the configured schedules.
    pub async fn run(&self) -> Result<()> {
        let mut execute = tokio::time::interval(Duration::from_secs(
            self.config.scheduler.execute_interval_secs,
        ));
        let mut maintenance = tokio::time::interval(Duration::from_secs(
            self.config.scheduler.maintenance_interval_secs,
        ));

        info!(
            execute_interval_secs = self.config.scheduler.execute_interval_secs,
            maintenance_interval_secs = self.config.scheduler.maintenance_interval_secs,
            "Runner started"
        );

        loop {
            tokio::select! {
                _ = execute.tick() => {
                    if let Err(e) = self.execute_pass().await {
                        error!(error = %e, "Execute pass failed");
                    }
                }
                _ = maintenance.tick() => {
                    if let Err(e) = self.maintenance_pass().await {
                        error!(error = %e, "Maintenance pass failed");
                    }
                }
            }
        }
    }

    /// One execution pass: fresh signals for every tradeable strategy.
    ///
    /// A failed trade attempt aborts only itself; the pass carries on
    /// with the next signal and strategy.
    pub async fn execute_pass(&self) -> Result<()> {
        let since = {
            let mut last = self.last_execute.lock().await;
            std::mem::replace(&mut *last, Utc::now())
        };

        let tracer = TradeTracer::for_run(Arc::clone(&self.store), Uuid::new_v4());
        let strategies = self.store.list_active_strategies().await?;

        for strategy in strategies.iter().filter(|s| s.is_tradeable()) {
            let signals = match self.source.fresh_signals(strategy, since).await {
                Ok(signals) => signals,
                Err(e) => {
                    warn!(strategy_id = %strategy.id, error = %e, "Signal fetch failed");
                    continue;
                }
            };

            for signal in signals {
                // Re-read: earlier signals in this pass may have moved capital.
                let current = match self.store.get_strategy(strategy.id).await {
                    Ok(Some(s)) => s,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(strategy_id = %strategy.id, error = %e, "Strategy read failed");
                        break;
                    }
                };

                let signal_tracer = tracer.for_signal(strategy.id);
                match self
                    .executor
                    .execute_signal(&current, &signal, &signal_tracer)
                    .await
                {
                    Ok(ExecutionResult::Executed(order)) => {
                        info!(order_id = %order.id, strategy_id = %strategy.id, "Trade executed");
                    }
                    Ok(ExecutionResult::Resting(order)) => {
                        info!(order_id = %order.id, strategy_id = %strategy.id, "Order resting");
                    }
                    Ok(ExecutionResult::Rejected(order)) => {
                        info!(
                            order_id = %order.id,
                            strategy_id = %strategy.id,
                            reason = ?order.risk_check_reason,
                            "Trade rejected"
                        );
                    }
                    Ok(ExecutionResult::Deduplicated) | Ok(ExecutionResult::Declined(_)) => {}
                    Err(e) => {
                        error!(
                            strategy_id = %strategy.id,
                            market_id = %signal.market_id,
                            error = %e,
                            "Trade attempt failed"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// One maintenance pass: exits, venue sync, cooldown drain,
    /// reconciliation, in that order.
    pub async fn maintenance_pass(&self) -> Result<()> {
        match self.sell_manager.scan().await {
            Ok(summary) => {
                if summary.exits_executed > 0 || summary.exits_failed > 0 {
                    info!(
                        exits = summary.exits_executed,
                        failed = summary.exits_failed,
                        "Exit scan complete"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Exit scan failed"),
        }

        match self.synchronizer.sync().await {
            Ok(summary) => {
                if summary.scanned > 0 {
                    info!(
                        scanned = summary.scanned,
                        filled = summary.filled,
                        cancelled = summary.cancelled,
                        lost = summary.lost,
                        "Order sync complete"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Order sync failed"),
        }

        for strategy in self.store.list_active_strategies().await? {
            match self.ledger.drain_cooldown(strategy.id).await {
                Ok(released) if released > rust_decimal::Decimal::ZERO => {
                    info!(strategy_id = %strategy.id, released = %released, "Cooldown drained");
                }
                Ok(_) => {}
                Err(e) => warn!(strategy_id = %strategy.id, error = %e, "Cooldown drain failed"),
            }
        }

        match self.reconciler.reconcile_all().await {
            Ok(corrected) if corrected > 0 => {
                warn!(corrected, "Capital drift corrected");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Reconciliation failed"),
        }

        Ok(())
    }
}
