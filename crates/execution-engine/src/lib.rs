//! Execution Engine
//!
//! End-to-end order execution for copy-trading strategies: capital ledger,
//! risk-gated order state machine, exit management, pending-order
//! synchronization and capital reconciliation.

pub mod events;
pub mod executor;
pub mod ledger;
pub mod reconciliation;
pub mod sell_manager;
pub mod sizing;
pub mod synchronizer;
pub mod token_cache;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_support;

pub use events::EventBus;
pub use executor::{ExecutionResult, TradeExecutor};
pub use ledger::CapitalLedger;
pub use reconciliation::CapitalReconciler;
pub use sell_manager::SellManager;
pub use sizing::{BetSizer, KellySizer};
pub use synchronizer::OrderSynchronizer;
pub use token_cache::TokenCache;
pub use trace::TradeTracer;
