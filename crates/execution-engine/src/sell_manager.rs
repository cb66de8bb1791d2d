//! Exit management for open positions.
//!
//! Two detectors run per scan: the copied trader selling out of a market
//! we hold, and a position crossing its stop-loss or take-profit
//! threshold. Exits are fill-or-kill at the best bid; a failed exit is
//! reported and retried naturally on the next scan.

use crate::events::EventBus;
use crate::ledger::CapitalLedger;
use chrono::{DateTime, Utc};
use copytrade_core::api::{VenueApi, VenueOrderRequest, VenueOrderType};
use copytrade_core::db::Store;
use copytrade_core::types::{
    CopyOrder, OrderEvent, OrderEventKind, OrderOutcome, OrderSide, Strategy,
};
use copytrade_core::{Error, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Why a position is being exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TraderExited,
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TraderExited => write!(f, "trader exited"),
            ExitReason::StopLoss => write!(f, "stop loss"),
            ExitReason::TakeProfit => write!(f, "take profit"),
        }
    }
}

/// Result of one exit scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub exits_executed: usize,
    pub exits_failed: usize,
}

pub struct SellManager {
    store: Arc<dyn Store>,
    venue: Arc<dyn VenueApi>,
    ledger: CapitalLedger,
    events: EventBus,
    /// Lower bound of the trader-activity window for the next scan.
    last_scan: Mutex<DateTime<Utc>>,
}

impl SellManager {
    pub fn new(store: Arc<dyn Store>, venue: Arc<dyn VenueApi>, events: EventBus) -> Self {
        Self {
            ledger: CapitalLedger::new(Arc::clone(&store)),
            store,
            venue,
            events,
            last_scan: Mutex::new(Utc::now()),
        }
    }

    /// Scan all open positions for exit conditions and execute the exits.
    ///
    /// Individual failures never abort the scan; they are counted and the
    /// position stays open for the next pass.
    pub async fn scan(&self) -> Result<ScanSummary> {
        let positions = self.store.list_open_positions(None).await?;
        if positions.is_empty() {
            return Ok(ScanSummary::default());
        }

        let since = {
            let mut last = self.last_scan.lock().await;
            std::mem::replace(&mut *last, Utc::now())
        };

        let mut by_strategy: HashMap<Uuid, Vec<CopyOrder>> = HashMap::new();
        for position in positions {
            by_strategy
                .entry(position.strategy_id)
                .or_default()
                .push(position);
        }

        let mut summary = ScanSummary::default();
        for (strategy_id, positions) in by_strategy {
            let strategy = match self.store.get_strategy(strategy_id).await? {
                Some(s) => s,
                None => {
                    warn!(strategy_id = %strategy_id, "Open positions for unknown strategy");
                    continue;
                }
            };

            let exited = self.trader_exits(&strategy, &positions, since).await;
            let mut remaining: Vec<&CopyOrder> = positions
                .iter()
                .filter(|p| !exited.contains(&p.id))
                .collect();

            for position in remaining.drain(..) {
                match self.threshold_reason(&strategy, position).await {
                    Some(reason) => match self.execute_exit(&strategy, position, reason).await {
                        Ok(true) => summary.exits_executed += 1,
                        Ok(false) => summary.exits_failed += 1,
                        Err(e) => {
                            warn!(
                                order_id = %position.id,
                                reason = %reason,
                                error = %e,
                                "Exit attempt failed"
                            );
                            summary.exits_failed += 1;
                        }
                    },
                    None => {}
                }
            }

            summary.exits_executed += exited.len();
        }

        Ok(summary)
    }

    /// Exit every position whose source trader sold the same market and
    /// outcome since the last scan. Returns the ids of exited orders.
    async fn trader_exits(
        &self,
        strategy: &Strategy,
        positions: &[CopyOrder],
        since: DateTime<Utc>,
    ) -> Vec<Uuid> {
        let activity = match self
            .venue
            .get_wallet_activity(&strategy.source_wallet, since)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    strategy_id = %strategy.id,
                    wallet = %strategy.source_wallet,
                    error = %e,
                    "Trader activity fetch failed"
                );
                return Vec::new();
            }
        };

        let sells: Vec<_> = activity
            .iter()
            .filter(|a| a.side == OrderSide::Sell && a.timestamp >= since)
            .collect();
        if sells.is_empty() {
            return Vec::new();
        }

        let mut exited = Vec::new();
        for position in positions {
            let matched = sells
                .iter()
                .any(|s| s.market_id == position.market_id && s.outcome == position.outcome);
            if !matched {
                continue;
            }
            match self
                .execute_exit(strategy, position, ExitReason::TraderExited)
                .await
            {
                Ok(true) => exited.push(position.id),
                Ok(false) => {}
                Err(e) => {
                    warn!(order_id = %position.id, error = %e, "Trader-exit sell failed");
                }
            }
        }
        exited
    }

    /// Threshold exit reason for one position, if its price has crossed
    /// the strategy's stop-loss or take-profit.
    async fn threshold_reason(
        &self,
        strategy: &Strategy,
        position: &CopyOrder,
    ) -> Option<ExitReason> {
        if strategy.stop_loss_pct.is_none() && strategy.take_profit_pct.is_none() {
            return None;
        }
        let entry = position.executed_price?;
        if entry <= Decimal::ZERO {
            return None;
        }
        let token_id = position.token_id.as_deref()?;

        let midpoint = match self.venue.get_midpoint(token_id).await {
            Ok(mid) => mid,
            Err(e) => {
                warn!(token_id, error = %e, "Midpoint fetch failed during exit scan");
                return None;
            }
        };

        let change = (midpoint - entry) / entry;
        if let Some(sl) = strategy.stop_loss_pct {
            if change <= -sl {
                return Some(ExitReason::StopLoss);
            }
        }
        if let Some(tp) = strategy.take_profit_pct {
            if change >= tp {
                return Some(ExitReason::TakeProfit);
            }
        }
        None
    }

    /// Sell the full remaining position at the best bid, fill-or-kill.
    ///
    /// Returns `Ok(true)` on a completed exit, `Ok(false)` when the venue
    /// did not match the order (position stays open).
    async fn execute_exit(
        &self,
        strategy: &Strategy,
        position: &CopyOrder,
        reason: ExitReason,
    ) -> Result<bool> {
        let token_id = position.token_id.clone().ok_or_else(|| Error::Order {
            message: format!("position {} has no token id", position.id),
        })?;
        let shares = position.shares_remaining;

        let exit_price = if strategy.shadow_mode {
            self.venue.get_midpoint(&token_id).await?
        } else {
            let book = self.venue.get_order_book(&token_id).await?;
            let best_bid = match book.best_bid() {
                Some(level) => level.price,
                None => {
                    warn!(
                        order_id = %position.id,
                        token_id = %token_id,
                        "No bids to exit into"
                    );
                    return Ok(false);
                }
            };

            let request = VenueOrderRequest {
                token_id: token_id.clone(),
                side: OrderSide::Sell,
                price: best_bid,
                shares,
                order_type: VenueOrderType::Fok,
            };
            let ack = self.venue.post_order(&request).await?;
            match self.venue.get_order(&ack.order_id).await? {
                Some(state) if state.size_matched >= shares => {}
                state => {
                    warn!(
                        order_id = %position.id,
                        venue_state = ?state,
                        "Fill-or-kill exit did not match"
                    );
                    return Ok(false);
                }
            }
            best_bid
        };

        let proceeds = shares * exit_price;
        let basis = position.remaining_cost_basis();
        let pnl = proceeds - basis;

        let mut order = position.clone();
        order.shares_remaining = Decimal::ZERO;
        order.outcome_result = OrderOutcome::Sold;
        order.realized_pnl += pnl;
        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;

        self.ledger
            .release(strategy.id, basis, proceeds, Some(order.id))
            .await?;

        let mut updated = match self.store.get_strategy(strategy.id).await? {
            Some(s) => s,
            None => strategy.clone(),
        };
        risk_manager::state::record_resolution(&mut updated, pnl);
        self.store.write_risk_counters(&updated).await?;

        self.events
            .publish(OrderEvent::from_order(OrderEventKind::Sold, &order));
        info!(
            order_id = %order.id,
            strategy_id = %strategy.id,
            reason = %reason,
            shares = %shares,
            exit_price = %exit_price,
            pnl = %pnl,
            "Position exited"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeVenue, FillMode};
    use chrono::Duration;
    use copytrade_core::api::ActivityEntry;
    use copytrade_core::db::MemoryStore;
    use copytrade_core::types::OrderStatus;

    struct Harness {
        store: Arc<MemoryStore>,
        venue: Arc<FakeVenue>,
        manager: SellManager,
        strategy: Strategy,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let venue = Arc::new(FakeVenue::new());
        let strategy = Strategy::new(
            Uuid::new_v4(),
            "0xTrader".to_string(),
            "test".to_string(),
            Decimal::new(100, 0),
        );
        store.insert_strategy(&strategy).await.unwrap();
        let manager = SellManager::new(store.clone(), venue.clone(), EventBus::default());
        Harness {
            store,
            venue,
            manager,
            strategy,
        }
    }

    /// A filled open position: 80 shares at $0.50, $40 locked.
    async fn open_position(h: &Harness) -> CopyOrder {
        let mut order = CopyOrder::new(
            "0xhash-1".to_string(),
            h.strategy.id,
            "m1".to_string(),
            "Yes".to_string(),
            OrderSide::Buy,
            Decimal::new(50, 2),
            Decimal::new(40, 0),
        );
        order.token_id = Some("tok-yes".to_string());
        order.status = OrderStatus::Filled;
        order.executed_price = Some(Decimal::new(50, 2));
        order.executed_size_usd = Decimal::new(40, 0);
        order.shares_bought = Decimal::new(80, 0);
        order.shares_remaining = Decimal::new(80, 0);
        h.store.insert_order(&order).await.unwrap();

        let mut s = h.strategy.clone();
        s.available_cash = Decimal::new(60, 0);
        s.locked_capital = Decimal::new(40, 0);
        h.store.insert_strategy(&s).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_trader_exit_sells_position() {
        let h = harness().await;
        let order = open_position(&h).await;
        h.venue.set_book(
            "tok-yes",
            copytrade_core::types::OrderBook {
                bids: vec![copytrade_core::types::PriceLevel {
                    price: Decimal::new(60, 2),
                    size: Decimal::new(1000, 0),
                }],
                asks: vec![],
            },
        );
        h.venue.set_wallet_activity(
            "0xTrader",
            vec![ActivityEntry {
                market_id: "m1".to_string(),
                outcome: "Yes".to_string(),
                side: OrderSide::Sell,
                shares: Decimal::new(500, 0),
                price: Decimal::new(60, 2),
                timestamp: Utc::now() + Duration::seconds(1),
                tx_hash: "0xexit".to_string(),
            }],
        );

        let summary = h.manager.scan().await.unwrap();
        assert_eq!(summary.exits_executed, 1);

        let sold = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(sold.outcome_result, OrderOutcome::Sold);
        assert_eq!(sold.shares_remaining, Decimal::ZERO);
        // 80 shares at 0.60 against a $40 basis.
        assert_eq!(sold.realized_pnl, Decimal::new(8, 0));

        let s = h.store.get_strategy(h.strategy.id).await.unwrap().unwrap();
        assert_eq!(s.locked_capital, Decimal::ZERO);
        assert_eq!(s.cooldown_capital, Decimal::new(48, 0));
    }

    #[tokio::test]
    async fn test_unrelated_trader_sell_is_ignored() {
        let h = harness().await;
        let order = open_position(&h).await;
        h.venue.set_wallet_activity(
            "0xTrader",
            vec![ActivityEntry {
                market_id: "other-market".to_string(),
                outcome: "Yes".to_string(),
                side: OrderSide::Sell,
                shares: Decimal::new(500, 0),
                price: Decimal::new(60, 2),
                timestamp: Utc::now() + Duration::seconds(1),
                tx_hash: "0xexit".to_string(),
            }],
        );

        let summary = h.manager.scan().await.unwrap();
        assert_eq!(summary.exits_executed, 0);

        let still_open = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(still_open.outcome_result, OrderOutcome::Open);
    }

    #[tokio::test]
    async fn test_stop_loss_triggers_exit() {
        let h = harness().await;
        let order = open_position(&h).await;
        let mut s = h.store.get_strategy(h.strategy.id).await.unwrap().unwrap();
        s.stop_loss_pct = Some(Decimal::new(30, 2));
        h.store.insert_strategy(&s).await.unwrap();

        // Entry 0.50, midpoint 0.30: down 40%, past the 30% stop.
        h.venue.set_midpoint("tok-yes", Decimal::new(30, 2));
        h.venue.set_book(
            "tok-yes",
            copytrade_core::types::OrderBook {
                bids: vec![copytrade_core::types::PriceLevel {
                    price: Decimal::new(30, 2),
                    size: Decimal::new(1000, 0),
                }],
                asks: vec![],
            },
        );

        let summary = h.manager.scan().await.unwrap();
        assert_eq!(summary.exits_executed, 1);

        let sold = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(sold.outcome_result, OrderOutcome::Sold);
        // 80 shares at 0.30 is $24 against a $40 basis.
        assert_eq!(sold.realized_pnl, Decimal::new(-16, 0));

        let s = h.store.get_strategy(h.strategy.id).await.unwrap().unwrap();
        assert_eq!(s.daily_loss, Decimal::new(16, 0));
        assert_eq!(s.consecutive_losses, 1);
    }

    #[tokio::test]
    async fn test_take_profit_triggers_exit() {
        let h = harness().await;
        let order = open_position(&h).await;
        let mut s = h.store.get_strategy(h.strategy.id).await.unwrap().unwrap();
        s.take_profit_pct = Some(Decimal::new(50, 2));
        h.store.insert_strategy(&s).await.unwrap();

        // Entry 0.50, midpoint 0.80: up 60%, past the 50% target.
        h.venue.set_midpoint("tok-yes", Decimal::new(80, 2));
        h.venue.set_book(
            "tok-yes",
            copytrade_core::types::OrderBook {
                bids: vec![copytrade_core::types::PriceLevel {
                    price: Decimal::new(79, 2),
                    size: Decimal::new(1000, 0),
                }],
                asks: vec![],
            },
        );

        let summary = h.manager.scan().await.unwrap();
        assert_eq!(summary.exits_executed, 1);

        let sold = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(sold.outcome_result, OrderOutcome::Sold);
        assert!(sold.realized_pnl > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_no_thresholds_means_no_exit() {
        let h = harness().await;
        let order = open_position(&h).await;
        h.venue.set_midpoint("tok-yes", Decimal::new(1, 2)); // collapsed

        let summary = h.manager.scan().await.unwrap();
        assert_eq!(summary.exits_executed, 0);

        let still_open = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(still_open.outcome_result, OrderOutcome::Open);
    }

    #[tokio::test]
    async fn test_failed_exit_keeps_position_open() {
        let h = harness().await;
        let order = open_position(&h).await;
        let mut s = h.store.get_strategy(h.strategy.id).await.unwrap().unwrap();
        s.stop_loss_pct = Some(Decimal::new(30, 2));
        h.store.insert_strategy(&s).await.unwrap();

        h.venue.set_midpoint("tok-yes", Decimal::new(20, 2));
        h.venue.set_book(
            "tok-yes",
            copytrade_core::types::OrderBook {
                bids: vec![copytrade_core::types::PriceLevel {
                    price: Decimal::new(20, 2),
                    size: Decimal::new(1000, 0),
                }],
                asks: vec![],
            },
        );
        // Venue refuses to match the fill-or-kill exit.
        h.venue.set_fill_mode(FillMode::CancelledOnArrival);

        let summary = h.manager.scan().await.unwrap();
        assert_eq!(summary.exits_executed, 0);
        assert_eq!(summary.exits_failed, 1);

        let still_open = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(still_open.outcome_result, OrderOutcome::Open);
        let s = h.store.get_strategy(h.strategy.id).await.unwrap().unwrap();
        assert_eq!(s.locked_capital, Decimal::new(40, 0));
    }
}
