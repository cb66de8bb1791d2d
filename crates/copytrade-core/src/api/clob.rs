//! Venue CLOB API client.
//!
//! The executor, sell manager and synchronizer talk to the venue only
//! through the [`VenueApi`] trait; [`ClobClient`] is the HTTP
//! implementation against the Polymarket-style CLOB endpoints.

use crate::types::{OrderBook, OrderSide, PriceLevel};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use tracing::warn;

/// Time-in-force for a venue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VenueOrderType {
    /// Fill-or-kill: fully filled immediately or cancelled.
    Fok,
    /// Good-til-cancelled: rests on the book.
    Gtc,
}

/// Order submission payload.
#[derive(Debug, Clone, Serialize)]
pub struct VenueOrderRequest {
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub shares: Decimal,
    pub order_type: VenueOrderType,
}

/// Venue acknowledgement of a submitted order.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueOrderAck {
    pub order_id: String,
    pub status: String,
}

/// Authoritative venue-side order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueOrderStatus {
    /// Resting on the book.
    Live,
    /// Fully matched.
    Matched,
    Cancelled,
    Expired,
    Rejected,
}

impl VenueOrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VenueOrderStatus::Live)
    }
}

/// Authoritative order state fetched from the venue.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueOrderState {
    pub order_id: String,
    pub status: VenueOrderStatus,
    /// Shares matched so far.
    pub size_matched: Decimal,
    pub original_size: Decimal,
}

/// A single fill reported by the venue trade history.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueFill {
    pub price: Decimal,
    pub shares: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// One activity record from a trader's public feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityEntry {
    pub market_id: String,
    pub outcome: String,
    pub side: OrderSide,
    pub shares: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    /// On-chain transaction hash; the stable identity of the trade.
    pub tx_hash: String,
}

/// Token id for one outcome of a market.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub outcome: String,
    pub token_id: String,
}

/// Venue operations consumed by the execution pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VenueApi: Send + Sync {
    /// Submit an order; returns the venue order id.
    async fn post_order(&self, request: &VenueOrderRequest) -> Result<VenueOrderAck>;

    /// Fetch an order by venue id. `None` when the venue has no record.
    async fn get_order(&self, venue_order_id: &str) -> Result<Option<VenueOrderState>>;

    /// Fetch the current order book for a token.
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook>;

    /// Fetch the current bid/ask midpoint for a token.
    async fn get_midpoint(&self, token_id: &str) -> Result<Decimal>;

    /// Fetch actual fills for an order (prices may improve on the limit).
    async fn get_order_fills(&self, venue_order_id: &str) -> Result<Vec<VenueFill>>;

    /// Fetch recent public activity for a trader wallet.
    async fn get_wallet_activity(
        &self,
        wallet: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEntry>>;

    /// Fetch the token ids for every outcome of a market.
    async fn get_market_tokens(&self, market_id: &str) -> Result<Vec<TokenInfo>>;
}

/// HTTP client for the venue CLOB API.
pub struct ClobClient {
    base_url: String,
    data_url: String,
    http_client: reqwest::Client,
}

impl ClobClient {
    /// Default CLOB API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://clob.polymarket.com";
    /// Default data API base URL (activity and trade history).
    pub const DEFAULT_DATA_URL: &'static str = "https://data-api.polymarket.com";

    /// Maximum retry attempts for API calls.
    const MAX_RETRIES: u32 = 3;

    pub fn new(base_url: Option<String>, data_url: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .connect_timeout(StdDuration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            data_url: data_url.unwrap_or_else(|| Self::DEFAULT_DATA_URL.to_string()),
            http_client,
        }
    }

    /// Execute an HTTP GET with retry and exponential backoff.
    ///
    /// Retries on 5xx server errors and 429 rate-limit responses (with a
    /// longer backoff for 429). All other 4xx errors fail immediately.
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..Self::MAX_RETRIES {
            match self.http_client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response)
                    if response.status().as_u16() == 429 || response.status().is_server_error() =>
                {
                    let status = response.status();
                    let is_rate_limited = status.as_u16() == 429;
                    warn!(
                        attempt = attempt + 1,
                        status = %status,
                        url = url,
                        rate_limited = is_rate_limited,
                        "Retryable API error, backing off"
                    );
                    last_error = Some(Error::Api {
                        message: format!(
                            "{}: {}",
                            if is_rate_limited {
                                "Rate limited"
                            } else {
                                "Server error"
                            },
                            status
                        ),
                        status: Some(status.as_u16()),
                    });
                    if attempt + 1 < Self::MAX_RETRIES {
                        let backoff = if is_rate_limited {
                            StdDuration::from_millis(2000 * 2u64.pow(attempt))
                        } else {
                            StdDuration::from_millis(500 * 2u64.pow(attempt))
                        };
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
                Ok(response) => {
                    return Err(Error::Api {
                        message: format!("API error: {}", response.status()),
                        status: Some(response.status().as_u16()),
                    });
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        error = %e,
                        url = url,
                        "HTTP request failed, backing off"
                    );
                    last_error = Some(Error::Http(e));
                }
            }

            if attempt + 1 < Self::MAX_RETRIES {
                let backoff = StdDuration::from_millis(500 * 2u64.pow(attempt));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error.unwrap_or(Error::Api {
            message: "Max retries exceeded".to_string(),
            status: None,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct RawBookLevel {
    price: Decimal,
    size: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawBookLevel>,
    #[serde(default)]
    asks: Vec<RawBookLevel>,
}

#[derive(Debug, Deserialize)]
struct MidpointResponse {
    mid: Decimal,
}

#[derive(Debug, Deserialize)]
struct MarketTokensResponse {
    tokens: Vec<TokenInfo>,
}

#[async_trait::async_trait]
impl VenueApi for ClobClient {
    async fn post_order(&self, request: &VenueOrderRequest) -> Result<VenueOrderAck> {
        let url = format!("{}/order", self.base_url);
        let response = self.http_client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Order {
                message: format!("Order submission failed ({}): {}", status, body),
            });
        }

        Ok(response.json().await?)
    }

    async fn get_order(&self, venue_order_id: &str) -> Result<Option<VenueOrderState>> {
        let url = format!("{}/data/order/{}", self.base_url, venue_order_id);
        match self.get_with_retry(&url).await {
            Ok(response) => Ok(Some(response.json().await?)),
            // A 404 means the venue has no record of the order, which the
            // synchronizer tracks separately from transport failures.
            Err(Error::Api {
                status: Some(404), ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book?token_id={}", self.base_url, token_id);
        let raw: RawBook = self.get_with_retry(&url).await?.json().await?;

        let mut bids: Vec<PriceLevel> = raw
            .bids
            .into_iter()
            .map(|l| PriceLevel {
                price: l.price,
                size: l.size,
            })
            .collect();
        let mut asks: Vec<PriceLevel> = raw
            .asks
            .into_iter()
            .map(|l| PriceLevel {
                price: l.price,
                size: l.size,
            })
            .collect();
        // Venue sends levels unsorted; normalize to best-first.
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Ok(OrderBook { bids, asks })
    }

    async fn get_midpoint(&self, token_id: &str) -> Result<Decimal> {
        let url = format!("{}/midpoint?token_id={}", self.base_url, token_id);
        let response: MidpointResponse = self.get_with_retry(&url).await?.json().await?;
        Ok(response.mid)
    }

    async fn get_order_fills(&self, venue_order_id: &str) -> Result<Vec<VenueFill>> {
        let url = format!("{}/data/trades?order_id={}", self.base_url, venue_order_id);
        Ok(self.get_with_retry(&url).await?.json().await?)
    }

    async fn get_wallet_activity(
        &self,
        wallet: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEntry>> {
        let url = format!(
            "{}/activity?user={}&start={}",
            self.data_url,
            wallet.to_lowercase(),
            since.timestamp()
        );
        Ok(self.get_with_retry(&url).await?.json().await?)
    }

    async fn get_market_tokens(&self, market_id: &str) -> Result<Vec<TokenInfo>> {
        let url = format!("{}/markets/{}", self.base_url, market_id);
        let response: MarketTokensResponse = self.get_with_retry(&url).await?.json().await?;
        Ok(response.tokens)
    }
}
