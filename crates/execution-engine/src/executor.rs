//! Order executor: drives one trade signal through the full lifecycle.
//!
//! The pipeline is dedup → size → lock → risk → resolve instrument →
//! guards → submit → immediate poll. Capital safety rests on one rule:
//! every path that locked cash either reaches a state where the capital
//! is legitimately committed (pending, partial, filled) or unlocks it
//! before returning.

use crate::events::EventBus;
use crate::ledger::CapitalLedger;
use crate::sizing::{BetSizer, SizingConfig};
use crate::token_cache::TokenCache;
use crate::trace::TradeTracer;
use copytrade_core::api::{VenueApi, VenueOrderRequest, VenueOrderStatus, VenueOrderType};
use copytrade_core::config::ExecutorConfig;
use copytrade_core::db::Store;
use copytrade_core::types::{
    CopyOrder, OrderEvent, OrderEventKind, OrderSide, OrderStatus, Strategy, TradeSignal,
};
use copytrade_core::{Error, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Outcome of one signal through the executor.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Filled or partially filled within the immediate poll window.
    Executed(CopyOrder),
    /// Resting on the book; handed off to the synchronizer.
    Resting(CopyOrder),
    /// Rejected by policy; an audit order was recorded.
    Rejected(CopyOrder),
    /// An order for this signal already exists; nothing was done.
    Deduplicated,
    /// The sizer declined the trade; nothing was done.
    Declined(String),
}

pub struct TradeExecutor {
    store: Arc<dyn Store>,
    venue: Arc<dyn VenueApi>,
    ledger: CapitalLedger,
    tokens: TokenCache,
    events: EventBus,
    sizer: Arc<dyn BetSizer>,
    sizing_config: SizingConfig,
    config: ExecutorConfig,
}

impl TradeExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        venue: Arc<dyn VenueApi>,
        events: EventBus,
        sizer: Arc<dyn BetSizer>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            ledger: CapitalLedger::new(Arc::clone(&store)),
            tokens: TokenCache::new(Arc::clone(&store), Arc::clone(&venue)),
            store,
            venue,
            events,
            sizer,
            sizing_config: SizingConfig::default(),
            config,
        }
    }

    pub fn with_sizing_config(mut self, sizing_config: SizingConfig) -> Self {
        self.sizing_config = sizing_config;
        self
    }

    /// Execute one trade signal for one strategy, end to end.
    pub async fn execute_signal(
        &self,
        strategy: &Strategy,
        signal: &TradeSignal,
        tracer: &TradeTracer,
    ) -> Result<ExecutionResult> {
        let dedup_key = signal.dedup_key();

        // Dedup: a prior order for this source trade means this signal was
        // already handled; silence, not an error.
        if self
            .store
            .find_order_by_dedup(strategy.id, &dedup_key)
            .await?
            .is_some()
        {
            tracer.stage("dedup", format!("signal {} already executed", dedup_key));
            return Ok(ExecutionResult::Deduplicated);
        }

        // Roll the daily counters before sizing against them.
        let mut strategy = strategy.clone();
        if risk_manager::state::maybe_reset_daily(&mut strategy) {
            self.store.write_risk_counters(&strategy).await?;
        }

        // Size the bet from the trader's stats and our bankroll.
        let edge = signal.trader_win_rate - signal.price;
        let raw_size = self.sizer.size(
            &self.sizing_config,
            signal.trader_win_rate,
            signal.price,
            edge,
            signal.conviction,
            strategy.equity(),
        );
        if raw_size <= Decimal::ZERO {
            tracer.stage("sized", "sizer declined the trade");
            return Ok(ExecutionResult::Declined("sizer returned zero".to_string()));
        }
        let size_usd = raw_size.clamp(self.config.min_order_size, self.config.max_order_size);
        tracer.stage("sized", format!("bet sized at ${}", size_usd));

        let mut order = CopyOrder::new(
            dedup_key,
            strategy.id,
            signal.market_id.clone(),
            signal.outcome.clone(),
            signal.side,
            signal.price,
            size_usd,
        );

        // Lock capital before anything can fail downstream.
        match self.ledger.lock(strategy.id, size_usd).await {
            Ok(available_after) => {
                tracer.stage("locked", format!("${} locked, ${} left", size_usd, available_after));
            }
            Err(e @ Error::InsufficientFunds { .. }) => {
                tracer.stage("locked", format!("lock failed: {}", e));
                let rejected = order.rejected(e.to_string());
                self.store.insert_order(&rejected).await?;
                return Ok(ExecutionResult::Rejected(rejected));
            }
            Err(e) => return Err(e),
        }

        // Risk gate, evaluated against the pre-lock capital state.
        let decision = risk_manager::check_risk(&strategy, size_usd, &signal.market_id);
        if !decision.allowed {
            tracer.stage("risk", format!("rejected: {}", decision.reason));
            self.ledger.unlock(strategy.id, size_usd).await?;
            let mut rejected = order.rejected(decision.reason);
            rejected.risk_check_passed = false;
            self.store.insert_order(&rejected).await?;
            return Ok(ExecutionResult::Rejected(rejected));
        }
        order.risk_check_passed = true;
        tracer.stage("risk", "all checks passed");

        // Instrument resolution failure is infrastructure, not policy:
        // unlock and surface the error without an audit record.
        let token_id = match self.tokens.resolve(&signal.market_id, &signal.outcome).await {
            Ok(token) => token,
            Err(e) => {
                tracer.stage("resolve", format!("resolution failed: {}", e));
                self.ledger.unlock(strategy.id, size_usd).await?;
                return Err(e);
            }
        };
        order.token_id = Some(token_id.clone());
        tracer.stage("resolve", format!("token {}", token_id));

        // Shadow mode: synthetic fill, no venue interaction. Capital is
        // tied up exactly as a real fill would, so the simulation and the
        // reconciler agree.
        if strategy.shadow_mode {
            order.status = OrderStatus::Filled;
            order.executed_price = Some(signal.price);
            order.shares_bought = if signal.price > Decimal::ZERO {
                size_usd / signal.price
            } else {
                Decimal::ZERO
            };
            order.shares_remaining = order.shares_bought;
            order.executed_size_usd = size_usd;
            self.store.insert_order(&order).await?;
            tracer.stage("shadow", "synthetic fill recorded");
            return Ok(ExecutionResult::Executed(order));
        }

        // Dead-market guard (buys only): a midpoint that collapsed since
        // the signal means the market already settled against us.
        if signal.side == OrderSide::Buy {
            if let Some(reason) = self.dead_market_reason(&token_id, signal).await {
                tracer.stage("guard", reason.clone());
                self.ledger.unlock(strategy.id, size_usd).await?;
                let rejected = order.rejected(reason);
                self.store.insert_order(&rejected).await?;
                return Ok(ExecutionResult::Rejected(rejected));
            }
        }

        // Convert to shares at the slippage-adjusted limit price.
        let limit_price = match signal.side {
            OrderSide::Buy => signal.price * (Decimal::ONE + self.config.slippage_tolerance),
            OrderSide::Sell => signal.price * (Decimal::ONE - self.config.slippage_tolerance),
        };
        let mut shares = if limit_price > Decimal::ZERO {
            size_usd / limit_price
        } else {
            Decimal::ZERO
        };
        let mut total_locked = size_usd;

        // Venue minimum: bump up and lock the difference, or walk away.
        if shares < self.config.min_venue_shares {
            let bumped_usd = self.config.min_venue_shares * limit_price;
            let extra = bumped_usd - total_locked;
            match self.ledger.lock(strategy.id, extra).await {
                Ok(_) => {
                    shares = self.config.min_venue_shares;
                    total_locked = bumped_usd;
                    order.signal_size_usd = bumped_usd;
                    tracer.stage("minimum", format!("bumped to {} shares (${})", shares, bumped_usd));
                }
                Err(Error::InsufficientFunds { .. }) => {
                    let reason = format!(
                        "below venue minimum of {} shares and bump unaffordable",
                        self.config.min_venue_shares
                    );
                    tracer.stage("minimum", reason.clone());
                    self.ledger.unlock(strategy.id, total_locked).await?;
                    let rejected = order.rejected(reason);
                    self.store.insert_order(&rejected).await?;
                    return Ok(ExecutionResult::Rejected(rejected));
                }
                Err(e) => {
                    self.ledger.unlock(strategy.id, total_locked).await?;
                    return Err(e);
                }
            }
        }

        // Liquidity: do not submit into a book that cannot plausibly fill
        // half the order at our limit.
        match self.venue.get_order_book(&token_id).await {
            Ok(book) => {
                let depth = book.depth_at(signal.side, limit_price);
                if depth * Decimal::new(2, 0) < shares {
                    let reason = format!(
                        "book depth {} below half of required {} shares",
                        depth, shares
                    );
                    tracer.stage("liquidity", reason.clone());
                    self.ledger.unlock(strategy.id, total_locked).await?;
                    let rejected = order.rejected(reason);
                    self.store.insert_order(&rejected).await?;
                    return Ok(ExecutionResult::Rejected(rejected));
                }
            }
            Err(e) => {
                tracer.stage("liquidity", format!("book fetch failed: {}", e));
                self.ledger.unlock(strategy.id, total_locked).await?;
                return Err(e);
            }
        }

        // Submit.
        let request = VenueOrderRequest {
            token_id: token_id.clone(),
            side: signal.side,
            price: limit_price,
            shares,
            order_type: VenueOrderType::Gtc,
        };
        let ack = match self.venue.post_order(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                error!(strategy_id = %strategy.id, error = %e, "Order submission failed");
                tracer.stage("submit", format!("submission failed: {}", e));
                self.ledger.unlock(strategy.id, total_locked).await?;
                // No order row: the dedup key must not block the next
                // pass from retrying this signal.
                order.status = OrderStatus::Failed;
                self.events
                    .publish(OrderEvent::from_order(OrderEventKind::Failed, &order));
                return Err(e);
            }
        };
        order.venue_order_id = Some(ack.order_id.clone());
        order.status = OrderStatus::Pending;
        self.store.insert_order(&order).await?;
        self.events
            .publish(OrderEvent::from_order(OrderEventKind::Placed, &order));
        tracer.stage("submit", format!("venue order {}", ack.order_id));

        // Immediate poll: catch instant fills cheaply, then hand off.
        self.poll_after_submit(
            &strategy,
            order,
            ack.order_id,
            total_locked,
            shares,
            limit_price,
            tracer,
        )
        .await
    }

    /// Poll the venue for a bounded window after submission and settle the
    /// order into filled, rejected, or resting.
    #[allow(clippy::too_many_arguments)]
    async fn poll_after_submit(
        &self,
        strategy: &Strategy,
        mut order: CopyOrder,
        venue_order_id: String,
        total_locked: Decimal,
        shares: Decimal,
        limit_price: Decimal,
        tracer: &TradeTracer,
    ) -> Result<ExecutionResult> {
        let deadline = Instant::now() + StdDuration::from_secs(self.config.poll_window_secs);
        let interval = StdDuration::from_millis(self.config.poll_interval_ms);

        let mut last_state = None;
        loop {
            match self.venue.get_order(&venue_order_id).await {
                Ok(Some(state)) => {
                    if state.status == VenueOrderStatus::Matched {
                        last_state = Some(state);
                        break;
                    }
                    if state.status.is_terminal() && state.size_matched <= Decimal::ZERO {
                        // Terminal with nothing filled: give the capital back.
                        tracer.stage("poll", format!("venue status {:?}, no fill", state.status));
                        self.ledger.unlock(strategy.id, total_locked).await?;
                        order.status = OrderStatus::Rejected;
                        order.risk_check_reason =
                            Some(format!("venue terminal status {:?}", state.status));
                        self.store.update_order(&order).await?;
                        self.events
                            .publish(OrderEvent::from_order(OrderEventKind::Cancelled, &order));
                        return Ok(ExecutionResult::Rejected(order));
                    }
                    last_state = Some(state);
                }
                Ok(None) => {} // venue may lag right after submission
                Err(e) => {
                    warn!(venue_order_id = %venue_order_id, error = %e, "Order poll failed");
                }
            }

            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        let matched = last_state
            .as_ref()
            .map(|s| s.size_matched)
            .unwrap_or(Decimal::ZERO);

        if matched <= Decimal::ZERO {
            // Still resting: capital stays locked, the synchronizer owns it
            // now, and nothing counts toward the daily budget yet.
            tracer.stage("poll", "no fill in window, left resting");
            return Ok(ExecutionResult::Resting(order));
        }

        // Fill price comes from actual trade fills, not the limit price;
        // venues can improve on the submitted price.
        let executed_price = self
            .executed_price_from_fills(&venue_order_id, limit_price)
            .await;
        let executed_size = matched * executed_price;
        let full_fill = matched >= shares;

        order.executed_price = Some(executed_price);
        order.executed_size_usd = executed_size;
        order.shares_bought = matched;
        order.shares_remaining = matched;
        order.status = if full_fill {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        self.store.update_order(&order).await?;

        if full_fill {
            // Price improvement leaves part of the lock uncommitted.
            let over_locked = total_locked - executed_size;
            if over_locked > Decimal::ZERO {
                self.ledger.unlock(strategy.id, over_locked).await?;
            }
        }

        let mut updated = strategy.clone();
        risk_manager::state::record_spend(&mut updated, executed_size);
        self.store.write_risk_counters(&updated).await?;

        let kind = if full_fill {
            OrderEventKind::Filled
        } else {
            OrderEventKind::PartialFill
        };
        self.events.publish(OrderEvent::from_order(kind, &order));

        info!(
            order_id = %order.id,
            strategy_id = %strategy.id,
            status = ?order.status,
            executed_price = %executed_price,
            shares = %matched,
            "Order executed"
        );
        tracer.stage(
            "filled",
            format!("{} shares at {}", matched, executed_price),
        );
        Ok(ExecutionResult::Executed(order))
    }

    /// Reason string when the market has died under the signal, or `None`
    /// when the trade is still viable.
    async fn dead_market_reason(&self, token_id: &str, signal: &TradeSignal) -> Option<String> {
        let midpoint = match self.venue.get_midpoint(token_id).await {
            Ok(mid) => mid,
            Err(e) => {
                // No midpoint is not proof of death; let the trade proceed
                // to the liquidity check.
                warn!(token_id, error = %e, "Midpoint fetch failed");
                return None;
            }
        };

        let floor = self.config.dead_market_floor;
        if midpoint < floor && signal.price >= floor * Decimal::new(2, 0) {
            return Some(format!(
                "midpoint {} collapsed below floor {} (signal at {})",
                midpoint, floor, signal.price
            ));
        }

        if signal.price > Decimal::ZERO {
            let drift = ((midpoint - signal.price) / signal.price).abs();
            if drift > self.config.max_price_drift_pct {
                return Some(format!(
                    "price drifted {} from signal {} to midpoint {}",
                    drift, signal.price, midpoint
                ));
            }
        }

        None
    }

    async fn executed_price_from_fills(&self, venue_order_id: &str, fallback: Decimal) -> Decimal {
        match self.venue.get_order_fills(venue_order_id).await {
            Ok(fills) if !fills.is_empty() => {
                let total_shares: Decimal = fills.iter().map(|f| f.shares).sum();
                if total_shares <= Decimal::ZERO {
                    return fallback;
                }
                let notional: Decimal = fills.iter().map(|f| f.price * f.shares).sum();
                notional / total_shares
            }
            Ok(_) => fallback,
            Err(e) => {
                warn!(venue_order_id, error = %e, "Fill history fetch failed, using limit price");
                fallback
            }
        }
    }
}
