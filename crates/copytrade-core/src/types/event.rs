//! Order lifecycle events published on the in-process event bus.

use crate::types::{CopyOrder, OrderStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Placed,
    Filled,
    PartialFill,
    Sold,
    Cancelled,
    Failed,
    Lost,
}

/// One lifecycle transition, as seen by observability consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub kind: OrderEventKind,
    pub order_id: Uuid,
    pub strategy_id: Uuid,
    pub status: OrderStatus,
    pub executed_size_usd: Decimal,
    pub shares: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OrderEvent {
    pub fn from_order(kind: OrderEventKind, order: &CopyOrder) -> Self {
        Self {
            kind,
            order_id: order.id,
            strategy_id: order.strategy_id,
            status: order.status,
            executed_size_usd: order.executed_size_usd,
            shares: order.shares_bought,
            timestamp: Utc::now(),
        }
    }
}
