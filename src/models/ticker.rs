//! Ticker (level-1) channel models.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::MessageKind;

#[derive(Debug, Clone, Deserialize)]
pub struct TickerUpdateResponse {
    pub channel: String,
    #[serde(rename = "type")]
    pub tpe: MessageKind,
    pub data: Vec<TickerData>,
}

/// Best bid/offer and rolling 24h statistics for one pair.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerData {
    pub symbol: String,
    pub bid: Decimal,
    pub bid_qty: Decimal,
    pub ask: Decimal,
    pub ask_qty: Decimal,
    pub last: Decimal,
    pub volume: Decimal,
    pub vwap: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub change: Decimal,
    pub change_pct: Decimal,
    /// Exchange timestamp, only sent by newer API versions.
    #[serde(default)]
    pub timestamp: Option<String>,
}
