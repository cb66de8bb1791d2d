//! Order types for trade execution and lifecycle tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Side of the order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Lifecycle status of a copy order.
///
/// `Pending` and `Partial` are the non-terminal states owned by the
/// synchronizer; everything else is terminal and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting on the venue book, no fill yet.
    Pending,
    /// Partially filled, remainder resting.
    Partial,
    /// Fully filled.
    Filled,
    /// Rejected by policy (risk, dedup-adjacent guards) or by the venue.
    Rejected,
    /// Cancelled at the venue before any fill.
    Cancelled,
    /// Vanished from the venue across repeated sync passes.
    Lost,
    /// Infrastructure failure during submission.
    Failed,
}

impl OrderStatus {
    /// Whether the synchronizer still owns this order.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Partial)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

/// Economic outcome of a filled position, tracked past the fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOutcome {
    /// Position held, market unresolved.
    Open,
    /// Exited via the sell manager before resolution.
    Sold,
    /// Market resolved in our favor.
    Won,
    /// Market resolved against us.
    Lost,
    /// Never became a position.
    Cancelled,
}

/// One attempted or completed copy trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyOrder {
    pub id: Uuid,
    /// Dedup key derived from the source signal; unique per strategy.
    pub source_trade_id: String,
    pub strategy_id: Uuid,
    pub market_id: String,
    /// Outcome label within the market (e.g. "Yes").
    pub outcome: String,
    /// Venue token id, once resolved.
    pub token_id: Option<String>,
    pub side: OrderSide,

    // Signal-time values
    pub signal_price: Decimal,
    pub signal_size_usd: Decimal,

    // Execution values
    pub executed_price: Option<Decimal>,
    pub executed_size_usd: Decimal,
    pub shares_bought: Decimal,
    /// Decremented by partial exits; outcome becomes Sold at zero.
    pub shares_remaining: Decimal,

    pub status: OrderStatus,
    pub outcome_result: OrderOutcome,
    /// P&L realized at resolution or exit (exit value minus cost).
    pub realized_pnl: Decimal,

    pub risk_check_passed: bool,
    pub risk_check_reason: Option<String>,

    pub venue_order_id: Option<String>,
    /// Consecutive sync passes where the venue had no record of this order.
    pub sync_misses: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CopyOrder {
    /// Create an order in its initial (pre-submission) shape.
    pub fn new(
        source_trade_id: String,
        strategy_id: Uuid,
        market_id: String,
        outcome: String,
        side: OrderSide,
        signal_price: Decimal,
        signal_size_usd: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_trade_id,
            strategy_id,
            market_id,
            outcome,
            token_id: None,
            side,
            signal_price,
            signal_size_usd,
            executed_price: None,
            executed_size_usd: Decimal::ZERO,
            shares_bought: Decimal::ZERO,
            shares_remaining: Decimal::ZERO,
            status: OrderStatus::Pending,
            outcome_result: OrderOutcome::Open,
            realized_pnl: Decimal::ZERO,
            risk_check_passed: false,
            risk_check_reason: None,
            venue_order_id: None,
            sync_misses: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// A rejected order kept for audit; never reached the venue.
    pub fn rejected(mut self, reason: impl Into<String>) -> Self {
        self.status = OrderStatus::Rejected;
        self.outcome_result = OrderOutcome::Cancelled;
        self.risk_check_reason = Some(reason.into());
        self
    }

    /// Cost basis of the shares still held.
    pub fn remaining_cost_basis(&self) -> Decimal {
        match self.executed_price {
            Some(price) => self.shares_remaining * price,
            None => Decimal::ZERO,
        }
    }

    /// Capital still committed to this order: resting signal size for
    /// unfilled orders, remaining cost basis for filled open positions.
    ///
    /// The unfilled remainder of a `Partial` order counts even after its
    /// filled shares are sold: the remainder is still live at the venue
    /// until the synchronizer sees it go terminal.
    pub fn committed_capital(&self) -> Decimal {
        match self.status {
            OrderStatus::Pending => self.signal_size_usd,
            OrderStatus::Partial => {
                let resting =
                    (self.signal_size_usd - self.executed_size_usd).max(Decimal::ZERO);
                if self.outcome_result == OrderOutcome::Open {
                    self.remaining_cost_basis() + resting
                } else {
                    resting
                }
            }
            OrderStatus::Filled if self.outcome_result == OrderOutcome::Open => {
                self.remaining_cost_basis()
            }
            _ => Decimal::ZERO,
        }
    }
}
