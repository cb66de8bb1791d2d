//! Order book types for venue market data.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price level in the order book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Snapshot of the venue order book for one token.
///
/// Bids and asks are sorted best-first (highest bid, lowest ask).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Total size available at or better than `limit` on the given side.
    pub fn depth_at(&self, side: crate::types::OrderSide, limit: Decimal) -> Decimal {
        match side {
            crate::types::OrderSide::Buy => self
                .asks
                .iter()
                .filter(|l| l.price <= limit)
                .map(|l| l.size)
                .sum(),
            crate::types::OrderSide::Sell => self
                .bids
                .iter()
                .filter(|l| l.price >= limit)
                .map(|l| l.size)
                .sum(),
        }
    }
}
