//! Trade-signal source backed by the copied trader's public activity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copytrade_core::api::VenueApi;
use copytrade_core::types::{OrderSide, Strategy, TradeSignal};
use copytrade_core::Result;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Supplies fresh trade signals for one strategy.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn fresh_signals(
        &self,
        strategy: &Strategy,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeSignal>>;
}

/// Derives buy signals from the source wallet's venue activity feed.
///
/// The feed carries no trader-quality stats, so win rate and conviction
/// come from configured defaults until a scoring service provides them.
pub struct ActivitySignalSource {
    venue: Arc<dyn VenueApi>,
    default_win_rate: Decimal,
    default_conviction: Decimal,
}

impl ActivitySignalSource {
    pub fn new(venue: Arc<dyn VenueApi>) -> Self {
        Self {
            venue,
            default_win_rate: Decimal::new(55, 2),
            default_conviction: Decimal::ONE,
        }
    }

    pub fn with_defaults(mut self, win_rate: Decimal, conviction: Decimal) -> Self {
        self.default_win_rate = win_rate;
        self.default_conviction = conviction;
        self
    }
}

#[async_trait]
impl SignalSource for ActivitySignalSource {
    async fn fresh_signals(
        &self,
        strategy: &Strategy,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeSignal>> {
        let activity = self
            .venue
            .get_wallet_activity(&strategy.source_wallet, since)
            .await?;

        Ok(activity
            .into_iter()
            .filter(|a| a.side == OrderSide::Buy && a.timestamp >= since)
            .map(|a| TradeSignal {
                trader_wallet: strategy.source_wallet.clone(),
                market_id: a.market_id,
                outcome: a.outcome,
                side: a.side,
                price: a.price,
                size_usd: a.shares * a.price,
                trader_win_rate: self.default_win_rate,
                conviction: self.default_conviction,
                timestamp: a.timestamp,
                tx_hash: a.tx_hash,
            })
            .collect())
    }
}
