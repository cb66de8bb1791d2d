//! Shared domain types.

pub mod event;
pub mod market;
pub mod order;
pub mod signal;
pub mod strategy;

pub use event::{OrderEvent, OrderEventKind};
pub use market::{OrderBook, PriceLevel};
pub use order::{CopyOrder, OrderOutcome, OrderSide, OrderStatus};
pub use signal::TradeSignal;
pub use strategy::{CooldownEntry, Strategy};
