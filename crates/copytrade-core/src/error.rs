//! Error types for the copy-trade execution engine.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Concurrent modification of strategy capital for {0}")]
    ConcurrentModification(String),

    #[error("Instrument resolution failed for market {market_id} outcome {outcome}")]
    InstrumentResolution { market_id: String, outcome: String },

    #[error("API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("Order error: {message}")]
    Order { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
