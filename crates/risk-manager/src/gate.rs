//! Ordered admission checks applied to every trade before capital commits.

use copytrade_core::types::Strategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Machine identifier for the check that rejected a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCheck {
    InsufficientCash,
    MaxPositionSize,
    MaxTotalExposure,
    DailyBudget,
    DailyLossLimit,
    DrawdownCircuitBreaker,
}

/// Outcome of the risk gate for one proposed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub allowed: bool,
    pub reason: String,
    pub check_failed: Option<RiskCheck>,
}

impl RiskDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "all checks passed".to_string(),
            check_failed: None,
        }
    }

    fn reject(check: RiskCheck, reason: String) -> Self {
        Self {
            allowed: false,
            reason,
            check_failed: Some(check),
        }
    }
}

/// Evaluate the admission checks for a proposed trade.
///
/// Checks run in a fixed order and short-circuit on the first failure:
/// available cash, per-position cap, total exposure, daily budget, daily
/// loss limit, drawdown. Deterministic and side-effect-free; callers
/// persist counters separately.
pub fn check_risk(strategy: &Strategy, trade_size_usd: Decimal, market_id: &str) -> RiskDecision {
    let _ = market_id; // reserved for per-market limits

    // 1. Physical capital.
    if strategy.available_cash < trade_size_usd {
        return RiskDecision::reject(
            RiskCheck::InsufficientCash,
            format!(
                "trade size ${} exceeds available cash ${}",
                trade_size_usd, strategy.available_cash
            ),
        );
    }

    // 2. Per-position cap.
    if let Some(max_position) = strategy.max_position_size {
        if trade_size_usd > max_position {
            return RiskDecision::reject(
                RiskCheck::MaxPositionSize,
                format!(
                    "trade size ${} exceeds per-position cap ${}",
                    trade_size_usd, max_position
                ),
            );
        }
    }

    // 3. Total exposure cap.
    if let Some(max_exposure) = strategy.max_total_exposure {
        if strategy.locked_capital + trade_size_usd > max_exposure {
            return RiskDecision::reject(
                RiskCheck::MaxTotalExposure,
                format!(
                    "locked ${} + trade ${} exceeds exposure cap ${}",
                    strategy.locked_capital, trade_size_usd, max_exposure
                ),
            );
        }
    }

    // 4. Daily budget (soft limit, resets at midnight).
    if let Some(budget) = strategy.daily_budget {
        if strategy.daily_spent + trade_size_usd > budget {
            return RiskDecision::reject(
                RiskCheck::DailyBudget,
                format!(
                    "daily spent ${} + trade ${} exceeds budget ${}",
                    strategy.daily_spent, trade_size_usd, budget
                ),
            );
        }
    }

    // 5. Daily loss circuit breaker.
    if let Some(max_loss) = strategy.max_daily_loss {
        if strategy.daily_loss >= max_loss {
            return RiskDecision::reject(
                RiskCheck::DailyLossLimit,
                format!(
                    "daily loss ${} at or above limit ${}",
                    strategy.daily_loss, max_loss
                ),
            );
        }
    }

    // 6. Drawdown circuit breaker.
    if let Some(breaker_pct) = strategy.circuit_breaker_pct {
        let drawdown = strategy.drawdown_pct();
        if drawdown >= breaker_pct {
            return RiskDecision::reject(
                RiskCheck::DrawdownCircuitBreaker,
                format!(
                    "drawdown {} at or above circuit breaker {}",
                    drawdown, breaker_pct
                ),
            );
        }
    }

    RiskDecision::allow()
}
