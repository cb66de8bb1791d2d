//! Risk-counter maintenance applied outside the gate.
//!
//! These functions mutate a `Strategy` in memory; callers persist the
//! result through the store's `write_risk_counters`.

use chrono::Utc;
use copytrade_core::types::Strategy;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Reset the daily counters when the local date has rolled over.
/// Returns whether a reset happened.
pub fn maybe_reset_daily(strategy: &mut Strategy) -> bool {
    let today = Utc::now().date_naive();
    if today > strategy.daily_reset_date {
        strategy.daily_spent = Decimal::ZERO;
        strategy.daily_loss = Decimal::ZERO;
        strategy.daily_reset_date = today;
        info!(strategy_id = %strategy.id, "Daily risk counters reset");
        true
    } else {
        false
    }
}

/// Record capital spent on a fill toward the daily budget.
pub fn record_spend(strategy: &mut Strategy, amount: Decimal) {
    maybe_reset_daily(strategy);
    strategy.daily_spent += amount;
}

/// Record a position resolution and re-evaluate the circuit breaker.
///
/// `pnl` is the realized profit (negative for a loss). Peak equity only
/// ratchets up; the breaker trips on the daily-loss limit or the drawdown
/// threshold and stays tripped until operator reset.
pub fn record_resolution(strategy: &mut Strategy, pnl: Decimal) {
    maybe_reset_daily(strategy);

    if pnl < Decimal::ZERO {
        strategy.daily_loss += -pnl;
        strategy.consecutive_losses += 1;
    } else {
        strategy.consecutive_losses = 0;
    }

    let equity = strategy.equity();
    if equity > strategy.peak_equity {
        strategy.peak_equity = equity;
    }

    let daily_loss_breach = strategy
        .max_daily_loss
        .map_or(false, |limit| strategy.daily_loss >= limit);
    let drawdown_breach = strategy
        .circuit_breaker_pct
        .map_or(false, |pct| strategy.drawdown_pct() >= pct);

    if (daily_loss_breach || drawdown_breach) && !strategy.circuit_breaker_active {
        strategy.circuit_breaker_active = true;
        warn!(
            strategy_id = %strategy.id,
            daily_loss = %strategy.daily_loss,
            drawdown = %strategy.drawdown_pct(),
            consecutive_losses = strategy.consecutive_losses,
            "Circuit breaker tripped"
        );
    }
}
