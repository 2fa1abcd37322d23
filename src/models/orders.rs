//! Level-3 (individual orders) channel models.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::MessageKind;

/// A snapshot or update message from the `level3` (orders) channel.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersUpdateResponse {
    pub channel: String,
    #[serde(rename = "type")]
    pub tpe: MessageKind,
    pub data: Vec<OrdersData>,
}

/// Level-3 order book data for a single trading pair.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersData {
    pub symbol: String,
    #[serde(default)]
    pub bids: Vec<OrderEntry>,
    #[serde(default)]
    pub asks: Vec<OrderEntry>,
    #[serde(default)]
    pub checksum: u32,
    #[serde(default)]
    pub timestamp: String,
}

/// A single order in the level-3 book.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEntry {
    /// Lifecycle event for this order. `None` on the initial snapshot.
    #[serde(default)]
    pub event: Option<OrderEvent>,
    pub order_id: String,
    pub limit_price: Decimal,
    pub order_qty: Decimal,
    pub timestamp: String,
}

/// Order lifecycle events carried by level-3 updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderEvent {
    Add,
    Modify,
    Delete,
}

impl OrderEvent {
    /// Single-letter action code stored in tick rows.
    pub fn action_code(&self) -> &'static str {
        match self {
            OrderEvent::Add => "A",
            OrderEvent::Modify => "M",
            OrderEvent::Delete => "C",
        }
    }
}
