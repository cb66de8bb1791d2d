//! Configuration management for the copy-trade execution engine.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub venue: VenueConfig,
    pub executor: ExecutorConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub clob_url: Option<String>,
    pub data_url: Option<String>,
}

/// Tunables for the order executor state machine.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Smallest order we will place, in USD.
    pub min_order_size: Decimal,
    /// Largest order we will place, in USD.
    pub max_order_size: Decimal,
    /// Venue minimum tradable quantity, in shares.
    pub min_venue_shares: Decimal,
    /// Interval between immediate post-submission polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Wall-clock cap on the immediate poll window, in seconds.
    pub poll_window_secs: u64,
    /// Midpoint floor below which a market is considered dead.
    pub dead_market_floor: Decimal,
    /// Maximum tolerated drift between signal price and current midpoint.
    pub max_price_drift_pct: Decimal,
    /// Slippage allowance applied when checking book depth.
    pub slippage_tolerance: Decimal,
    /// Consecutive sync passes with no venue record before an order is
    /// declared lost.
    pub lost_order_threshold: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between execution passes.
    pub execute_interval_secs: u64,
    /// Seconds between sell-scan / sync / reconciliation passes.
    pub maintenance_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| Error::Config {
                    message: "DATABASE_URL environment variable not set".to_string(),
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            venue: VenueConfig {
                clob_url: env::var("VENUE_CLOB_URL").ok(),
                data_url: env::var("VENUE_DATA_URL").ok(),
            },
            executor: ExecutorConfig {
                min_order_size: parse_decimal_env("EXECUTOR_MIN_ORDER_SIZE", Decimal::ONE),
                max_order_size: parse_decimal_env("EXECUTOR_MAX_ORDER_SIZE", Decimal::new(500, 0)),
                min_venue_shares: parse_decimal_env("VENUE_MIN_SHARES", Decimal::new(5, 0)),
                poll_interval_ms: env::var("EXECUTOR_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
                poll_window_secs: env::var("EXECUTOR_POLL_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                dead_market_floor: parse_decimal_env("DEAD_MARKET_FLOOR", Decimal::new(5, 2)),
                max_price_drift_pct: parse_decimal_env("MAX_PRICE_DRIFT_PCT", Decimal::new(20, 2)),
                slippage_tolerance: parse_decimal_env("SLIPPAGE_TOLERANCE", Decimal::new(2, 2)),
                lost_order_threshold: env::var("LOST_ORDER_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
            },
            scheduler: SchedulerConfig {
                execute_interval_secs: env::var("EXECUTE_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
                maintenance_interval_secs: env::var("MAINTENANCE_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            },
        })
    }

    /// Configuration with defaults suitable for tests.
    pub fn test_config() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/copytrade_test".to_string(),
                max_connections: 2,
            },
            venue: VenueConfig {
                clob_url: None,
                data_url: None,
            },
            executor: ExecutorConfig::default(),
            scheduler: SchedulerConfig {
                execute_interval_secs: 60,
                maintenance_interval_secs: 300,
            },
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_order_size: Decimal::ONE,
            max_order_size: Decimal::new(500, 0),
            min_venue_shares: Decimal::new(5, 0),
            poll_interval_ms: 500,
            poll_window_secs: 5,
            dead_market_floor: Decimal::new(5, 2),      // $0.05 midpoint
            max_price_drift_pct: Decimal::new(20, 2),   // 20%
            slippage_tolerance: Decimal::new(2, 2),     // 2%
            lost_order_threshold: 3,
        }
    }
}

fn parse_decimal_env(key: &str, default: Decimal) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
