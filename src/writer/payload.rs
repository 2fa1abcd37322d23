//! Typed units of work handed from feeds to the writer.

use rust_decimal::Decimal;

use crate::book::BookLine;
use crate::models::book::BookDepth;
use crate::models::candle::CandleData;
use crate::models::instrument::{AssetInfo, PairInfo};
use crate::models::orders::{OrderEntry, OrderEvent};
use crate::models::ticker::TickerData;
use crate::models::trade::TradeData;

/// Storage destinations, one per recorded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriterChannel {
    L1,
    L2,
    L3,
    Ohlc,
    Trades,
    Instruments,
}

impl WriterChannel {
    pub const ALL: [WriterChannel; 6] = [
        WriterChannel::L1,
        WriterChannel::L2,
        WriterChannel::L3,
        WriterChannel::Ohlc,
        WriterChannel::Trades,
        WriterChannel::Instruments,
    ];

    /// Name used for tables, file stems, and per-channel mode overrides.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriterChannel::L1 => "L1",
            WriterChannel::L2 => "L2",
            WriterChannel::L3 => "L3",
            WriterChannel::Ohlc => "OHLC",
            WriterChannel::Trades => "trades",
            WriterChannel::Instruments => "instruments",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        WriterChannel::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-channel lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerChannel<T>([T; 6]);

impl<T: Copy> PerChannel<T> {
    pub fn splat(value: T) -> Self {
        Self([value; 6])
    }

    pub fn get(&self, channel: WriterChannel) -> T {
        self.0[channel.index()]
    }

    pub fn set(&mut self, channel: WriterChannel, value: T) {
        self.0[channel.index()] = value;
    }
}

/// Renders a typed row into string fields in column order.
pub trait Record {
    fn fields(&self) -> Vec<String>;
}

/// One `ticker` observation.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRow {
    pub timestamp: String,
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
}

impl TickerRow {
    /// Uses the exchange timestamp when present, else `received`.
    pub fn from_data(data: TickerData, received: &str) -> Self {
        Self {
            timestamp: data.timestamp.unwrap_or_else(|| received.to_string()),
            symbol: data.symbol,
            bid: data.bid,
            bid_qty: data.bid_qty,
            ask: data.ask,
            ask_qty: data.ask_qty,
            last: data.last,
            volume: data.volume,
            vwap: data.vwap,
            low: data.low,
            high: data.high,
            change: data.change,
            change_pct: data.change_pct,
        }
    }
}

impl Record for TickerRow {
    fn fields(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.symbol.clone(),
            self.bid.to_string(),
            self.bid_qty.to_string(),
            self.ask.to_string(),
            self.ask_qty.to_string(),
            self.last.to_string(),
            self.volume.to_string(),
            self.vwap.to_string(),
            self.low.to_string(),
            self.high.to_string(),
            self.change.to_string(),
            self.change_pct.to_string(),
        ]
    }
}

/// One level-3 order event.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRow {
    /// `"b"` or `"a"`.
    pub side: &'static str,
    pub ts_event: String,
    pub ts_recv: String,
    pub price: Decimal,
    pub size: Decimal,
    /// `A`dd, `M`odify, or `C`ancel.
    pub action: &'static str,
    pub order_id: String,
    pub symbol: String,
}

impl TickRow {
    /// Returns `None` for snapshot entries, which carry no event.
    pub fn from_entry(side: &'static str, entry: OrderEntry, symbol: &str, received: &str) -> Option<Self> {
        let action = entry.event.map(|e: OrderEvent| e.action_code())?;
        Some(Self {
            side,
            ts_event: entry.timestamp,
            ts_recv: received.to_string(),
            price: entry.limit_price,
            size: entry.order_qty,
            action,
            order_id: entry.order_id,
            symbol: symbol.to_string(),
        })
    }
}

impl Record for TickRow {
    fn fields(&self) -> Vec<String> {
        vec![
            self.side.to_string(),
            self.ts_event.clone(),
            self.ts_recv.clone(),
            self.price.to_string(),
            self.size.to_string(),
            self.action.to_string(),
            self.order_id.clone(),
            self.symbol.clone(),
        ]
    }
}

/// One OHLC bar.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRow {
    /// End of the interval.
    pub timestamp: String,
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub vwap: Decimal,
    pub trades: u64,
    /// Start of the interval.
    pub tstart: String,
    /// When the exchange sent the bar.
    pub ttrue: String,
}

impl CandleRow {
    pub fn from_data(data: CandleData, sent: &str) -> Self {
        Self {
            timestamp: data.timestamp,
            symbol: data.symbol,
            open: data.open,
            high: data.high,
            low: data.low,
            close: data.close,
            volume: data.volume,
            vwap: data.vwap,
            trades: data.trades,
            tstart: data.interval_begin,
            ttrue: sent.to_string(),
        }
    }
}

impl Record for CandleRow {
    fn fields(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.symbol.clone(),
            self.open.to_string(),
            self.high.to_string(),
            self.low.to_string(),
            self.close.to_string(),
            self.volume.to_string(),
            self.vwap.to_string(),
            self.trades.to_string(),
            self.tstart.clone(),
            self.ttrue.clone(),
        ]
    }
}

/// One executed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    pub ts_event: String,
    pub symbol: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub side: String,
    pub ord_type: String,
    pub trade_id: u64,
}

impl From<TradeData> for TradeRow {
    fn from(data: TradeData) -> Self {
        Self {
            ts_event: data.timestamp,
            symbol: data.symbol,
            price: data.price,
            qty: data.qty,
            side: data.side,
            ord_type: data.ord_type,
            trade_id: data.trade_id,
        }
    }
}

impl Record for TradeRow {
    fn fields(&self) -> Vec<String> {
        vec![
            self.ts_event.clone(),
            self.symbol.clone(),
            self.price.to_string(),
            self.qty.to_string(),
            self.side.clone(),
            self.ord_type.clone(),
            self.trade_id.to_string(),
        ]
    }
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "None".to_string(), ToString::to_string)
}

impl Record for PairInfo {
    fn fields(&self) -> Vec<String> {
        vec![
            self.symbol.clone(),
            self.base.clone(),
            self.quote.clone(),
            self.status.clone(),
            self.qty_precision.to_string(),
            self.qty_increment.to_string(),
            self.price_precision.to_string(),
            self.cost_precision.to_string(),
            self.marginable.to_string(),
            self.has_index.to_string(),
            opt(&self.cost_min),
            opt(&self.margin_initial),
            opt(&self.position_limit_long),
            opt(&self.position_limit_short),
            opt(&self.tick_size),
            self.price_increment.to_string(),
            opt(&self.qty_min),
        ]
    }
}

impl Record for AssetInfo {
    fn fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.status.clone(),
            self.precision.to_string(),
            self.precision_display.to_string(),
            self.borrowable.to_string(),
            self.collateral_value.to_string(),
            opt(&self.margin_rate),
        ]
    }
}

/// Whether an OHLC payload carries the live bar or a closed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleMode {
    /// The in-progress bar; at most one row is written per payload.
    Update,
    /// Completed bars, written in bulk.
    Snapshot,
}

/// A unit of work on the writer queue.
#[derive(Debug, Clone)]
pub enum WriterPayload {
    Ticker(Vec<TickerRow>),
    Book { line: BookLine, depth: BookDepth },
    Level3 { ticks: Vec<TickRow>, out_file_name: String },
    Candles { mode: CandleMode, rows: Vec<CandleRow> },
    Trades(Vec<TradeRow>),
    Instruments { pairs: Vec<PairInfo>, assets: Vec<AssetInfo> },
}

impl WriterPayload {
    pub fn channel(&self) -> WriterChannel {
        match self {
            WriterPayload::Ticker(_) => WriterChannel::L1,
            WriterPayload::Book { .. } => WriterChannel::L2,
            WriterPayload::Level3 { .. } => WriterChannel::L3,
            WriterPayload::Candles { .. } => WriterChannel::Ohlc,
            WriterPayload::Trades(_) => WriterChannel::Trades,
            WriterPayload::Instruments { .. } => WriterChannel::Instruments,
        }
    }
}

pub(crate) fn to_fields<R: Record>(rows: &[R]) -> Vec<Vec<String>> {
    rows.iter().map(Record::fields).collect()
}
