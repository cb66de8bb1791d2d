//! External venue API clients.

pub mod clob;

pub use clob::{
    ActivityEntry, ClobClient, TokenInfo, VenueApi, VenueFill, VenueOrderAck, VenueOrderRequest,
    VenueOrderState, VenueOrderStatus, VenueOrderType,
};
