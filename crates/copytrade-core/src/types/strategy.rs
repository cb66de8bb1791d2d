//! Strategy: one capital- and risk-isolated copy-trading unit.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A capital- and risk-isolated trading unit copying one source wallet.
///
/// Capital is split across three buckets: `available_cash` (spendable),
/// `locked_capital` (committed to open orders/positions), and
/// `cooldown_capital` (resolved proceeds in the settlement window).
/// The ledger owns every mutation of these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Wallet address of the trader this strategy copies.
    pub source_wallet: String,
    pub name: String,

    // Activity flags
    pub active: bool,
    pub paused: bool,
    /// When set, orders are recorded but never submitted to the venue.
    pub shadow_mode: bool,
    pub circuit_breaker_active: bool,

    // Capital buckets
    pub initial_capital: Decimal,
    pub available_cash: Decimal,
    pub locked_capital: Decimal,
    pub cooldown_capital: Decimal,
    /// Settlement delay before resolved proceeds become spendable.
    pub cooldown_hours: i64,

    // Risk limits (None = unconfigured, check skipped)
    pub max_position_size: Option<Decimal>,
    pub max_total_exposure: Option<Decimal>,
    pub daily_budget: Option<Decimal>,
    pub max_daily_loss: Option<Decimal>,
    /// Drawdown fraction (e.g. 0.25) that trips the circuit breaker.
    pub circuit_breaker_pct: Option<Decimal>,

    // Exit thresholds (None = detector skipped)
    /// Loss fraction from entry that triggers an exit (e.g. 0.30).
    pub stop_loss_pct: Option<Decimal>,
    /// Gain fraction from entry that triggers an exit (e.g. 0.50).
    pub take_profit_pct: Option<Decimal>,

    // Risk counters
    pub daily_spent: Decimal,
    pub daily_loss: Decimal,
    pub daily_reset_date: NaiveDate,
    pub peak_equity: Decimal,
    pub consecutive_losses: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    /// Create a strategy with fresh capital and no optional limits.
    pub fn new(user_id: Uuid, source_wallet: String, name: String, capital: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            source_wallet,
            name,
            active: true,
            paused: false,
            shadow_mode: false,
            circuit_breaker_active: false,
            initial_capital: capital,
            available_cash: capital,
            locked_capital: Decimal::ZERO,
            cooldown_capital: Decimal::ZERO,
            cooldown_hours: 24,
            max_position_size: None,
            max_total_exposure: None,
            daily_budget: None,
            max_daily_loss: None,
            circuit_breaker_pct: None,
            stop_loss_pct: None,
            take_profit_pct: None,
            daily_spent: Decimal::ZERO,
            daily_loss: Decimal::ZERO,
            daily_reset_date: now.date_naive(),
            peak_equity: capital,
            consecutive_losses: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total equity across all three capital buckets.
    pub fn equity(&self) -> Decimal {
        self.available_cash + self.locked_capital + self.cooldown_capital
    }

    /// Fractional decline from peak equity (0 when at or above peak).
    pub fn drawdown_pct(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let dd = (self.peak_equity - self.equity()) / self.peak_equity;
        dd.max(Decimal::ZERO)
    }

    /// Whether the executor should process signals for this strategy.
    pub fn is_tradeable(&self) -> bool {
        self.active && !self.paused && !self.circuit_breaker_active
    }
}

/// A quantum of resolved capital awaiting its settlement window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub id: Uuid,
    pub strategy_id: Uuid,
    pub amount: Decimal,
    /// Order that produced these proceeds, when known.
    pub order_id: Option<Uuid>,
    pub available_at: DateTime<Utc>,
    /// Set exactly once by the drain; the idempotence gate.
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CooldownEntry {
    pub fn new(
        strategy_id: Uuid,
        amount: Decimal,
        order_id: Option<Uuid>,
        available_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy_id,
            amount,
            order_id,
            available_at,
            released_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drawdown_pct() {
        let mut s = Strategy::new(
            Uuid::new_v4(),
            "0xabc".to_string(),
            "test".to_string(),
            Decimal::new(100, 0),
        );
        s.peak_equity = Decimal::new(100, 0);
        s.available_cash = Decimal::new(75, 0);
        assert_eq!(s.drawdown_pct(), Decimal::new(25, 2));
    }

    #[test]
    fn test_drawdown_zero_at_peak() {
        let s = Strategy::new(
            Uuid::new_v4(),
            "0xabc".to_string(),
            "test".to_string(),
            Decimal::new(100, 0),
        );
        assert_eq!(s.drawdown_pct(), Decimal::ZERO);
    }
}
