//! Risk gate and risk-state maintenance for the copy-trade engine.
//!
//! The gate ([`gate::check_risk`]) is a pure function over a strategy's
//! current state; all counter mutation lives in [`state`] and is persisted
//! by the callers.

pub mod gate;
pub mod state;

pub use gate::{check_risk, RiskCheck, RiskDecision};
