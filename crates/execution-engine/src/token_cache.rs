//! Instrument resolution: market + outcome to a tradable token id.
//!
//! Three-tier lookup: in-memory map, durable store, venue. A venue hit
//! populates every outcome of the market into both lower tiers, so the
//! second outcome of a binary market never costs another round trip.

use copytrade_core::api::VenueApi;
use copytrade_core::db::Store;
use copytrade_core::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TokenCache {
    store: Arc<dyn Store>,
    venue: Arc<dyn VenueApi>,
    memory: DashMap<(String, String), String>,
}

impl TokenCache {
    pub fn new(store: Arc<dyn Store>, venue: Arc<dyn VenueApi>) -> Self {
        Self {
            store,
            venue,
            memory: DashMap::new(),
        }
    }

    /// Resolve the token id for one outcome of a market.
    pub async fn resolve(&self, market_id: &str, outcome: &str) -> Result<String> {
        let key = (market_id.to_string(), outcome.to_string());

        if let Some(token) = self.memory.get(&key) {
            return Ok(token.clone());
        }

        if let Some(token) = self.store.get_token(market_id, outcome).await? {
            self.memory.insert(key, token.clone());
            return Ok(token);
        }

        debug!(market_id, outcome, "Token cache miss, querying venue");
        let tokens = self.venue.get_market_tokens(market_id).await?;
        for info in &tokens {
            self.memory.insert(
                (market_id.to_string(), info.outcome.clone()),
                info.token_id.clone(),
            );
            if let Err(e) = self
                .store
                .put_token(market_id, &info.outcome, &info.token_id)
                .await
            {
                warn!(market_id, outcome = %info.outcome, error = %e, "Failed to persist token mapping");
            }
        }

        tokens
            .into_iter()
            .find(|t| t.outcome == outcome)
            .map(|t| t.token_id)
            .ok_or_else(|| Error::InstrumentResolution {
                market_id: market_id.to_string(),
                outcome: outcome.to_string(),
            })
    }
}
