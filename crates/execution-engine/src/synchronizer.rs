//! Reconciles resting orders against venue state.
//!
//! The executor hands off any order that does not settle inside its poll
//! window; from then on this synchronizer owns the order until it
//! reaches a terminal status. It also detects orders the venue has lost
//! all record of and recovers their locked capital.

use crate::events::EventBus;
use crate::ledger::CapitalLedger;
use chrono::Utc;
use copytrade_core::api::{VenueApi, VenueOrderState};
use copytrade_core::db::Store;
use copytrade_core::types::{CopyOrder, OrderEvent, OrderEventKind, OrderOutcome, OrderStatus};
use copytrade_core::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Counts from one synchronization pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub scanned: usize,
    pub filled: usize,
    pub cancelled: usize,
    pub lost: usize,
}

pub struct OrderSynchronizer {
    store: Arc<dyn Store>,
    venue: Arc<dyn VenueApi>,
    ledger: CapitalLedger,
    events: EventBus,
    /// Consecutive venue misses before an order is declared lost.
    lost_order_threshold: i32,
}

impl OrderSynchronizer {
    pub fn new(
        store: Arc<dyn Store>,
        venue: Arc<dyn VenueApi>,
        events: EventBus,
        lost_order_threshold: i32,
    ) -> Self {
        Self {
            ledger: CapitalLedger::new(Arc::clone(&store)),
            store,
            venue,
            events,
            lost_order_threshold,
        }
    }

    /// Sync every open order against the venue. Per-order failures are
    /// logged and skipped; the order is retried next pass.
    pub async fn sync(&self) -> Result<SyncSummary> {
        let open = self
            .store
            .list_orders_by_status(&[OrderStatus::Pending, OrderStatus::Partial])
            .await?;

        let mut summary = SyncSummary {
            scanned: open.len(),
            ..Default::default()
        };

        for order in open {
            let venue_order_id = match order.venue_order_id.clone() {
                Some(id) => id,
                None => continue, // never reached the venue
            };

            match self.venue.get_order(&venue_order_id).await {
                Ok(Some(state)) => {
                    if let Err(e) = self.apply_state(order, state, &mut summary).await {
                        warn!(venue_order_id = %venue_order_id, error = %e, "Order sync failed");
                    }
                }
                Ok(None) => {
                    if let Err(e) = self.record_miss(order, &mut summary).await {
                        warn!(venue_order_id = %venue_order_id, error = %e, "Miss handling failed");
                    }
                }
                Err(e) => {
                    warn!(venue_order_id = %venue_order_id, error = %e, "Venue lookup failed");
                }
            }
        }

        Ok(summary)
    }

    /// Fold fresh venue state into a stored order.
    async fn apply_state(
        &self,
        mut order: CopyOrder,
        state: VenueOrderState,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let prev_matched = order.shares_bought;
        let matched = state.size_matched;
        let terminal = state.status.is_terminal();

        if order.sync_misses > 0 {
            // The venue knows the order again; forget the misses.
            order.sync_misses = 0;
            self.store.update_order(&order).await?;
        }

        if !terminal && matched <= prev_matched {
            return Ok(()); // still resting, nothing new
        }

        let sold_shares = order.shares_bought - order.shares_remaining;

        if matched > prev_matched {
            let fallback = order.executed_price.unwrap_or(order.signal_price);
            let price = self.fill_price(&order, fallback).await;
            let prev_executed = order.executed_size_usd;

            order.executed_price = Some(price);
            order.executed_size_usd = matched * price;
            order.shares_bought = matched;
            order.shares_remaining = matched - sold_shares;

            // New fills count toward today's budget.
            let spent_delta = (order.executed_size_usd - prev_executed).max(Decimal::ZERO);
            if spent_delta > Decimal::ZERO {
                if let Some(mut strategy) = self.store.get_strategy(order.strategy_id).await? {
                    risk_manager::state::record_spend(&mut strategy, spent_delta);
                    self.store.write_risk_counters(&strategy).await?;
                }
            }
        }

        if terminal {
            // Whatever did not fill is never going to; recover its lock.
            let unfilled = (order.signal_size_usd - order.executed_size_usd).max(Decimal::ZERO);
            if unfilled > Decimal::ZERO {
                self.ledger.unlock(order.strategy_id, unfilled).await?;
            }

            if matched > Decimal::ZERO {
                order.status = OrderStatus::Filled;
                summary.filled += 1;
            } else {
                order.status = OrderStatus::Cancelled;
                order.outcome_result = OrderOutcome::Cancelled;
                summary.cancelled += 1;
            }
        } else if matched > Decimal::ZERO {
            order.status = OrderStatus::Partial;
            if matched > prev_matched {
                summary.filled += 1;
            }
        }

        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;

        let kind = match order.status {
            OrderStatus::Filled => OrderEventKind::Filled,
            OrderStatus::Partial => OrderEventKind::PartialFill,
            _ => OrderEventKind::Cancelled,
        };
        self.events.publish(OrderEvent::from_order(kind, &order));

        info!(
            order_id = %order.id,
            status = ?order.status,
            shares = %order.shares_bought,
            "Synced order from venue"
        );
        Ok(())
    }

    /// The venue returned 404 for an order we believe is open.
    ///
    /// A single miss can be replication lag; only a run of misses marks
    /// the order lost and recovers its capital.
    async fn record_miss(&self, mut order: CopyOrder, summary: &mut SyncSummary) -> Result<()> {
        order.sync_misses += 1;
        if order.sync_misses < self.lost_order_threshold {
            order.updated_at = Utc::now();
            self.store.update_order(&order).await?;
            return Ok(());
        }

        let unfilled = (order.signal_size_usd - order.executed_size_usd).max(Decimal::ZERO);
        if unfilled > Decimal::ZERO {
            self.ledger.unlock(order.strategy_id, unfilled).await?;
        }

        if order.shares_bought > Decimal::ZERO {
            // Partial fills are a real position even if the resting
            // remainder vanished with the order.
            order.status = OrderStatus::Filled;
        } else {
            order.status = OrderStatus::Lost;
            order.outcome_result = OrderOutcome::Cancelled;
        }
        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;
        summary.lost += 1;

        warn!(
            order_id = %order.id,
            venue_order_id = ?order.venue_order_id,
            misses = order.sync_misses,
            unlocked = %unfilled,
            "Order vanished from venue"
        );
        self.events
            .publish(OrderEvent::from_order(OrderEventKind::Lost, &order));
        Ok(())
    }

    async fn fill_price(&self, order: &CopyOrder, fallback: Decimal) -> Decimal {
        let venue_order_id = match order.venue_order_id.as_deref() {
            Some(id) => id,
            None => return fallback,
        };
        match self.venue.get_order_fills(venue_order_id).await {
            Ok(fills) if !fills.is_empty() => {
                let total: Decimal = fills.iter().map(|f| f.shares).sum();
                if total <= Decimal::ZERO {
                    return fallback;
                }
                let notional: Decimal = fills.iter().map(|f| f.price * f.shares).sum();
                notional / total
            }
            Ok(_) => fallback,
            Err(e) => {
                warn!(venue_order_id, error = %e, "Fill history fetch failed");
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeVenue;
    use copytrade_core::api::{VenueFill, VenueOrderStatus};
    use copytrade_core::db::MemoryStore;
    use copytrade_core::types::{OrderSide, Strategy};
    use uuid::Uuid;

    struct Harness {
        store: Arc<MemoryStore>,
        venue: Arc<FakeVenue>,
        sync: OrderSynchronizer,
        strategy_id: Uuid,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let venue = Arc::new(FakeVenue::new());
        let mut strategy = Strategy::new(
            Uuid::new_v4(),
            "0xTrader".to_string(),
            "test".to_string(),
            Decimal::new(100, 0),
        );
        // $40 resting on the book.
        strategy.available_cash = Decimal::new(60, 0);
        strategy.locked_capital = Decimal::new(40, 0);
        let strategy_id = strategy.id;
        store.insert_strategy(&strategy).await.unwrap();

        let sync = OrderSynchronizer::new(store.clone(), venue.clone(), EventBus::default(), 3);
        Harness {
            store,
            venue,
            sync,
            strategy_id,
        }
    }

    /// A pending order resting at the venue: $40 for 80 shares at 0.50.
    async fn resting_order(h: &Harness) -> CopyOrder {
        let mut order = CopyOrder::new(
            "0xhash-1".to_string(),
            h.strategy_id,
            "m1".to_string(),
            "Yes".to_string(),
            OrderSide::Buy,
            Decimal::new(50, 2),
            Decimal::new(40, 0),
        );
        order.token_id = Some("tok-yes".to_string());
        order.venue_order_id = Some("venue-77".to_string());
        h.store.insert_order(&order).await.unwrap();
        h.venue.set_order_state(
            "venue-77",
            VenueOrderState {
                order_id: "venue-77".to_string(),
                status: VenueOrderStatus::Live,
                size_matched: Decimal::ZERO,
                original_size: Decimal::new(80, 0),
            },
        );
        order
    }

    #[tokio::test]
    async fn test_unchanged_order_is_skipped() {
        let h = harness().await;
        let order = resting_order(&h).await;

        let summary = h.sync.sync().await.unwrap();
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.filled, 0);

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Pending);
        let s = h.store.get_strategy(h.strategy_id).await.unwrap().unwrap();
        assert_eq!(s.locked_capital, Decimal::new(40, 0));
    }

    #[tokio::test]
    async fn test_delayed_fill_is_applied() {
        let h = harness().await;
        let order = resting_order(&h).await;

        h.venue.set_order_state(
            "venue-77",
            VenueOrderState {
                order_id: "venue-77".to_string(),
                status: VenueOrderStatus::Matched,
                size_matched: Decimal::new(80, 0),
                original_size: Decimal::new(80, 0),
            },
        );
        h.venue.set_order_fills(
            "venue-77",
            vec![VenueFill {
                price: Decimal::new(50, 2),
                shares: Decimal::new(80, 0),
                timestamp: Utc::now(),
            }],
        );

        let summary = h.sync.sync().await.unwrap();
        assert_eq!(summary.filled, 1);

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Filled);
        assert_eq!(after.shares_bought, Decimal::new(80, 0));
        assert_eq!(after.executed_size_usd, Decimal::new(40, 0));

        let s = h.store.get_strategy(h.strategy_id).await.unwrap().unwrap();
        // Fully spent: nothing to unlock, spend recorded.
        assert_eq!(s.locked_capital, Decimal::new(40, 0));
        assert_eq!(s.available_cash, Decimal::new(60, 0));
        assert_eq!(s.daily_spent, Decimal::new(40, 0));
    }

    #[tokio::test]
    async fn test_venue_cancel_recovers_capital() {
        let h = harness().await;
        let order = resting_order(&h).await;

        h.venue.set_order_state(
            "venue-77",
            VenueOrderState {
                order_id: "venue-77".to_string(),
                status: VenueOrderStatus::Cancelled,
                size_matched: Decimal::ZERO,
                original_size: Decimal::new(80, 0),
            },
        );

        let summary = h.sync.sync().await.unwrap();
        assert_eq!(summary.cancelled, 1);

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Cancelled);
        assert_eq!(after.outcome_result, OrderOutcome::Cancelled);

        let s = h.store.get_strategy(h.strategy_id).await.unwrap().unwrap();
        assert_eq!(s.available_cash, Decimal::new(100, 0));
        assert_eq!(s.locked_capital, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_vanished_order_marked_lost_after_threshold() {
        let h = harness().await;
        let order = resting_order(&h).await;
        h.venue.vanish_order("venue-77");

        // Two misses: still pending, counter climbing.
        h.sync.sync().await.unwrap();
        h.sync.sync().await.unwrap();
        let mid = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(mid.status, OrderStatus::Pending);
        assert_eq!(mid.sync_misses, 2);

        // Third miss crosses the threshold.
        let summary = h.sync.sync().await.unwrap();
        assert_eq!(summary.lost, 1);

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Lost);

        let s = h.store.get_strategy(h.strategy_id).await.unwrap().unwrap();
        assert_eq!(s.available_cash, Decimal::new(100, 0));
        assert_eq!(s.locked_capital, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_reappearing_order_resets_miss_counter() {
        let h = harness().await;
        let order = resting_order(&h).await;

        h.venue.vanish_order("venue-77");
        h.sync.sync().await.unwrap();
        h.sync.sync().await.unwrap();

        // Venue recovers before the threshold.
        h.venue.set_order_state(
            "venue-77",
            VenueOrderState {
                order_id: "venue-77".to_string(),
                status: VenueOrderStatus::Live,
                size_matched: Decimal::ZERO,
                original_size: Decimal::new(80, 0),
            },
        );
        h.sync.sync().await.unwrap();

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.sync_misses, 0);
        assert_eq!(after.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_partial_then_terminal_unlocks_remainder() {
        let h = harness().await;
        let order = resting_order(&h).await;

        // Half filled, then the venue expires the rest.
        h.venue.set_order_state(
            "venue-77",
            VenueOrderState {
                order_id: "venue-77".to_string(),
                status: VenueOrderStatus::Expired,
                size_matched: Decimal::new(40, 0),
                original_size: Decimal::new(80, 0),
            },
        );
        h.venue.set_order_fills(
            "venue-77",
            vec![VenueFill {
                price: Decimal::new(50, 2),
                shares: Decimal::new(40, 0),
                timestamp: Utc::now(),
            }],
        );

        let summary = h.sync.sync().await.unwrap();
        assert_eq!(summary.filled, 1);

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Filled);
        assert_eq!(after.shares_bought, Decimal::new(40, 0));
        assert_eq!(after.executed_size_usd, Decimal::new(20, 0));

        let s = h.store.get_strategy(h.strategy_id).await.unwrap().unwrap();
        // $20 spent, $20 recovered.
        assert_eq!(s.available_cash, Decimal::new(80, 0));
        assert_eq!(s.locked_capital, Decimal::new(20, 0));
        assert_eq!(s.daily_spent, Decimal::new(20, 0));
    }

    #[tokio::test]
    async fn test_partial_fill_keeps_lock_while_live() {
        let h = harness().await;
        let order = resting_order(&h).await;

        h.venue.set_order_state(
            "venue-77",
            VenueOrderState {
                order_id: "venue-77".to_string(),
                status: VenueOrderStatus::Live,
                size_matched: Decimal::new(40, 0),
                original_size: Decimal::new(80, 0),
            },
        );
        h.venue.set_order_fills(
            "venue-77",
            vec![VenueFill {
                price: Decimal::new(50, 2),
                shares: Decimal::new(40, 0),
                timestamp: Utc::now(),
            }],
        );

        h.sync.sync().await.unwrap();

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Partial);

        // Remainder is still resting: the full lock stands.
        let s = h.store.get_strategy(h.strategy_id).await.unwrap().unwrap();
        assert_eq!(s.locked_capital, Decimal::new(40, 0));
    }
}
