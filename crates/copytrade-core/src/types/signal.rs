//! Trade signals observed from copied traders.

use crate::types::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An observed trade by a copied trader, the input to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub trader_wallet: String,
    pub market_id: String,
    /// Outcome label within the market (e.g. "Yes").
    pub outcome: String,
    pub side: OrderSide,
    /// Price the copied trader paid.
    pub price: Decimal,
    /// USD value of the copied trader's fill.
    pub size_usd: Decimal,
    /// Historical win rate of the copied trader, 0..1.
    pub trader_win_rate: Decimal,
    /// Conviction score from the classifier, 0..1.
    pub conviction: Decimal,
    pub timestamp: DateTime<Utc>,
    /// On-chain transaction hash of the source trade.
    pub tx_hash: String,
}

impl TradeSignal {
    /// Deduplication key: one copy attempt per source fill per outcome.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.tx_hash,
            self.trader_wallet.to_lowercase(),
            self.market_id,
            self.outcome
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_stable_across_wallet_case() {
        let mut signal = TradeSignal {
            trader_wallet: "0xAbC".to_string(),
            market_id: "m1".to_string(),
            outcome: "Yes".to_string(),
            side: OrderSide::Buy,
            price: Decimal::new(50, 2),
            size_usd: Decimal::new(100, 0),
            trader_win_rate: Decimal::new(60, 2),
            conviction: Decimal::new(8, 1),
            timestamp: Utc::now(),
            tx_hash: "0xhash".to_string(),
        };
        let key = signal.dedup_key();
        signal.trader_wallet = "0xabc".to_string();
        assert_eq!(signal.dedup_key(), key);
    }
}
