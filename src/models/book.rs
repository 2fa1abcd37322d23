//! Order book channel models.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::MessageKind;

/// Depths accepted by the `book` channel subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BookDepth {
    #[default]
    D10,
    D25,
    D100,
    D500,
    D1000,
}

impl BookDepth {
    pub fn as_u16(&self) -> u16 {
        match self {
            BookDepth::D10 => 10,
            BookDepth::D25 => 25,
            BookDepth::D100 => 100,
            BookDepth::D500 => 500,
            BookDepth::D1000 => 1000,
        }
    }

    pub fn as_usize(&self) -> usize {
        usize::from(self.as_u16())
    }
}

impl TryFrom<u16> for BookDepth {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(BookDepth::D10),
            25 => Ok(BookDepth::D25),
            100 => Ok(BookDepth::D100),
            500 => Ok(BookDepth::D500),
            1000 => Ok(BookDepth::D1000),
            other => Err(format!(
                "unsupported book depth {other}, expected one of 10, 25, 100, 500, 1000"
            )),
        }
    }
}

impl FromStr for BookDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u16 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid book depth {s:?}: {e}"))?;
        BookDepth::try_from(raw)
    }
}

/// A snapshot or update message from the `book` channel.
#[derive(Debug, Clone, Deserialize)]
pub struct BookUpdateResponse {
    pub channel: String,
    #[serde(rename = "type")]
    pub tpe: MessageKind,
    pub data: Vec<BookData>,
}

/// Order book snapshot or incremental update for a single trading pair.
///
/// Either side may be absent from an update; absent sides decode as empty.
#[derive(Debug, Clone, Deserialize)]
pub struct BookData {
    pub symbol: String,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
    /// CRC32 checksum used to verify order book integrity.
    #[serde(default)]
    pub checksum: u32,
    #[serde(default)]
    pub timestamp: String,
}

/// A single price level in the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, qty: Decimal) -> Self {
        Self { price, qty }
    }

    /// A zero quantity deletes the level.
    pub fn is_removal(&self) -> bool {
        self.qty.is_zero()
    }
}
