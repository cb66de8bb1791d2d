//! Pluggable bet-sizing policy.
//!
//! The executor treats sizing as a black box over wallet config, trader
//! win rate, price, edge, conviction and bankroll. The default is a
//! conviction-scaled half-Kelly clamped to a sane fraction of bankroll.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-wallet sizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Kelly fraction multiplier (0.5 = half-Kelly).
    pub kelly_fraction: Decimal,
    /// Lower clamp on the bankroll fraction per bet.
    pub min_fraction: Decimal,
    /// Upper clamp on the bankroll fraction per bet.
    pub max_fraction: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: Decimal::new(5, 1), // half-Kelly
            min_fraction: Decimal::new(2, 2),   // 2%
            max_fraction: Decimal::new(15, 2),  // 15%
        }
    }
}

/// Black-box bet-size function consumed by the executor.
pub trait BetSizer: Send + Sync {
    /// Compute the USD bet size. Zero means "do not bet".
    fn size(
        &self,
        config: &SizingConfig,
        win_rate: Decimal,
        price: Decimal,
        edge: Decimal,
        conviction: Decimal,
        bankroll: Decimal,
    ) -> Decimal;
}

/// Fractional-Kelly sizer scaled by conviction.
#[derive(Debug, Default, Clone)]
pub struct KellySizer;

impl BetSizer for KellySizer {
    fn size(
        &self,
        config: &SizingConfig,
        win_rate: Decimal,
        price: Decimal,
        edge: Decimal,
        conviction: Decimal,
        bankroll: Decimal,
    ) -> Decimal {
        if price <= Decimal::ZERO || price >= Decimal::ONE || bankroll <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        // Net odds for a binary payout at this price.
        let b = (Decimal::ONE - price) / price;
        let p = win_rate.clamp(Decimal::ZERO, Decimal::ONE);
        let q = Decimal::ONE - p;

        // f* = (p·b − q) / b, nudged by the classifier edge.
        let kelly = (p * b - q) / b + edge;
        if kelly <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let scaled = kelly * config.kelly_fraction * conviction.clamp(Decimal::ZERO, Decimal::ONE);
        let fraction = scaled.clamp(config.min_fraction, config.max_fraction);
        bankroll * fraction
    }
}
