//! OHLC candlestick channel models.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::MessageKind;

/// Candle intervals (in minutes) accepted by the `ohlc` channel.
pub const VALID_INTERVALS: [u32; 9] = [1, 5, 15, 30, 60, 240, 1440, 10080, 21600];

/// A snapshot or update message from the `ohlc` (candles) channel.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleUpdateResponse {
    pub channel: String,
    #[serde(rename = "type")]
    pub tpe: MessageKind,
    /// Time the exchange sent the message.
    #[serde(default)]
    pub timestamp: String,
    pub data: Vec<CandleData>,
}

/// A single OHLC candlestick bar.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleData {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Volume-weighted average price for this candle.
    pub vwap: Decimal,
    pub trades: u64,
    pub volume: Decimal,
    /// Start timestamp of this candle's time window.
    pub interval_begin: String,
    /// Candle duration in minutes.
    pub interval: u32,
    /// End of this candle's time window.
    pub timestamp: String,
}
