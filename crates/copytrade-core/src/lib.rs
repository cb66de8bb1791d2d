//! Copy-Trade Core Library
//!
//! Shared types, venue API client, and durable store for the copy-trade
//! execution engine.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod types;

pub use error::{Error, Result};
