//! Scripted venue double shared by the engine tests.

use chrono::{DateTime, Utc};
use copytrade_core::api::{
    ActivityEntry, TokenInfo, VenueApi, VenueFill, VenueOrderAck, VenueOrderRequest,
    VenueOrderState, VenueOrderStatus,
};
use copytrade_core::types::{OrderBook, OrderSide, PriceLevel};
use copytrade_core::{Error, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// How the fake venue treats a freshly posted order.
#[derive(Debug, Clone, Copy)]
pub enum FillMode {
    /// Fully matched on the first status poll.
    Immediate,
    /// Rests live with no fill.
    Resting,
    /// Live with the given fraction matched (e.g. 0.5 = half).
    Partial(Decimal),
    /// Terminal cancel with no fill.
    CancelledOnArrival,
}

/// In-memory venue with scriptable responses.
pub struct FakeVenue {
    tokens: Mutex<HashMap<String, Vec<TokenInfo>>>,
    midpoints: Mutex<HashMap<String, Decimal>>,
    books: Mutex<HashMap<String, OrderBook>>,
    states: Mutex<HashMap<String, VenueOrderState>>,
    fills: Mutex<HashMap<String, Vec<VenueFill>>>,
    activity: Mutex<HashMap<String, Vec<ActivityEntry>>>,
    submitted: Mutex<Vec<VenueOrderRequest>>,
    fill_mode: Mutex<FillMode>,
    fill_price: Mutex<Option<Decimal>>,
    fail_post: AtomicBool,
    next_id: AtomicU64,
}

impl FakeVenue {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            midpoints: Mutex::new(HashMap::new()),
            books: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            fills: Mutex::new(HashMap::new()),
            activity: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            fill_mode: Mutex::new(FillMode::Immediate),
            fill_price: Mutex::new(None),
            fail_post: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn set_market_tokens(&self, market_id: &str, pairs: &[(&str, &str)]) {
        self.tokens.lock().unwrap().insert(
            market_id.to_string(),
            pairs
                .iter()
                .map(|(outcome, token)| TokenInfo {
                    outcome: outcome.to_string(),
                    token_id: token.to_string(),
                })
                .collect(),
        );
    }

    pub fn clear_market_tokens(&self) {
        self.tokens.lock().unwrap().clear();
    }

    pub fn set_midpoint(&self, token_id: &str, mid: Decimal) {
        self.midpoints
            .lock()
            .unwrap()
            .insert(token_id.to_string(), mid);
    }

    pub fn set_book(&self, token_id: &str, book: OrderBook) {
        self.books.lock().unwrap().insert(token_id.to_string(), book);
    }

    pub fn set_fill_mode(&self, mode: FillMode) {
        *self.fill_mode.lock().unwrap() = mode;
    }

    /// Override the fill price reported in trade history (price improvement).
    pub fn set_fill_price(&self, price: Decimal) {
        *self.fill_price.lock().unwrap() = Some(price);
    }

    pub fn set_fail_post(&self, fail: bool) {
        self.fail_post.store(fail, Ordering::SeqCst);
    }

    pub fn set_order_state(&self, venue_order_id: &str, state: VenueOrderState) {
        self.states
            .lock()
            .unwrap()
            .insert(venue_order_id.to_string(), state);
    }

    /// Simulate the venue losing all record of an order.
    pub fn vanish_order(&self, venue_order_id: &str) {
        self.states.lock().unwrap().remove(venue_order_id);
        self.fills.lock().unwrap().remove(venue_order_id);
    }

    pub fn set_order_fills(&self, venue_order_id: &str, fills: Vec<VenueFill>) {
        self.fills
            .lock()
            .unwrap()
            .insert(venue_order_id.to_string(), fills);
    }

    pub fn set_wallet_activity(&self, wallet: &str, entries: Vec<ActivityEntry>) {
        self.activity
            .lock()
            .unwrap()
            .insert(wallet.to_lowercase(), entries);
    }

    pub fn submitted_orders(&self) -> Vec<VenueOrderRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl VenueApi for FakeVenue {
    async fn post_order(&self, request: &VenueOrderRequest) -> Result<VenueOrderAck> {
        if self.fail_post.load(Ordering::SeqCst) {
            return Err(Error::Order {
                message: "venue unavailable".to_string(),
            });
        }

        let id = format!("venue-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.submitted.lock().unwrap().push(request.clone());

        let mode = *self.fill_mode.lock().unwrap();
        let (status, matched) = match mode {
            FillMode::Immediate => (VenueOrderStatus::Matched, request.shares),
            FillMode::Resting => (VenueOrderStatus::Live, Decimal::ZERO),
            FillMode::Partial(frac) => (VenueOrderStatus::Live, request.shares * frac),
            FillMode::CancelledOnArrival => (VenueOrderStatus::Cancelled, Decimal::ZERO),
        };

        self.states.lock().unwrap().insert(
            id.clone(),
            VenueOrderState {
                order_id: id.clone(),
                status,
                size_matched: matched,
                original_size: request.shares,
            },
        );

        if matched > Decimal::ZERO {
            let price = self.fill_price.lock().unwrap().unwrap_or(request.price);
            self.fills.lock().unwrap().insert(
                id.clone(),
                vec![VenueFill {
                    price,
                    shares: matched,
                    timestamp: Utc::now(),
                }],
            );
        }

        Ok(VenueOrderAck {
            order_id: id,
            status: "submitted".to_string(),
        })
    }

    async fn get_order(&self, venue_order_id: &str) -> Result<Option<VenueOrderState>> {
        Ok(self.states.lock().unwrap().get(venue_order_id).cloned())
    }

    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook> {
        if let Some(book) = self.books.lock().unwrap().get(token_id) {
            return Ok(book.clone());
        }
        // Deep default book quoted at the midpoint on both sides, so a
        // zero-slippage order at the signal price clears the liquidity
        // check unless a test narrows the book.
        let mid = self.midpoint_for(token_id);
        Ok(OrderBook {
            bids: vec![PriceLevel {
                price: mid,
                size: Decimal::new(1_000_000, 0),
            }],
            asks: vec![PriceLevel {
                price: mid,
                size: Decimal::new(1_000_000, 0),
            }],
        })
    }

    async fn get_midpoint(&self, token_id: &str) -> Result<Decimal> {
        Ok(self.midpoint_for(token_id))
    }

    async fn get_order_fills(&self, venue_order_id: &str) -> Result<Vec<VenueFill>> {
        Ok(self
            .fills
            .lock()
            .unwrap()
            .get(venue_order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_wallet_activity(
        &self,
        wallet: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEntry>> {
        Ok(self
            .activity
            .lock()
            .unwrap()
            .get(&wallet.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_market_tokens(&self, market_id: &str) -> Result<Vec<TokenInfo>> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(market_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl FakeVenue {
    fn midpoint_for(&self, token_id: &str) -> Decimal {
        self.midpoints
            .lock()
            .unwrap()
            .get(token_id)
            .copied()
            .unwrap_or_else(|| Decimal::new(50, 2))
    }
}

/// Sizer returning a constant USD amount.
pub struct FixedSizer(pub Decimal);

impl crate::sizing::BetSizer for FixedSizer {
    fn size(
        &self,
        _config: &crate::sizing::SizingConfig,
        _win_rate: Decimal,
        _price: Decimal,
        _edge: Decimal,
        _conviction: Decimal,
        _bankroll: Decimal,
    ) -> Decimal {
        self.0
    }
}

/// Build a buy signal for tests.
pub fn buy_signal(market_id: &str, price: Decimal) -> copytrade_core::types::TradeSignal {
    copytrade_core::types::TradeSignal {
        trader_wallet: "0xTrader".to_string(),
        market_id: market_id.to_string(),
        outcome: "Yes".to_string(),
        side: OrderSide::Buy,
        price,
        size_usd: Decimal::new(1000, 0),
        trader_win_rate: Decimal::new(60, 2),
        conviction: Decimal::ONE,
        timestamp: Utc::now(),
        tx_hash: format!("0xhash-{}", uuid::Uuid::new_v4()),
    }
}
