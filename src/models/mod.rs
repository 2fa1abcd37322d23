//! Shared models for Kraken WebSocket V2 messages.
//!
//! Contains channel definitions, subscription request/response types,
//! and common protocol messages (ping/pong, heartbeat, status). Channel
//! payloads live in the per-channel submodules.

pub mod book;
pub mod candle;
pub mod instrument;
pub mod orders;
pub mod ticker;
pub mod trade;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Available Kraken WebSocket V2 channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Book,
    Ticker,
    /// Level-3 individual orders (wire name: `"level3"`).
    Orders,
    /// OHLC candlestick data (wire name: `"ohlc"`).
    Candles,
    Trades,
    Instruments,
    Status,
    Heartbeat,
}

impl Channel {
    /// Returns the wire-format channel name expected by the Kraken API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Book => "book",
            Channel::Ticker => "ticker",
            Channel::Orders => "level3",
            Channel::Candles => "ohlc",
            Channel::Trades => "trade",
            Channel::Instruments => "instrument",
            Channel::Status => "status",
            Channel::Heartbeat => "heartbeat",
        }
    }

    /// Maps a wire-format channel name back to its variant.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "book" => Some(Channel::Book),
            "ticker" => Some(Channel::Ticker),
            "level3" => Some(Channel::Orders),
            "ohlc" => Some(Channel::Candles),
            "trade" => Some(Channel::Trades),
            "instrument" => Some(Channel::Instruments),
            "status" => Some(Channel::Status),
            "heartbeat" => Some(Channel::Heartbeat),
            _ => None,
        }
    }

    /// Whether subscribing requires a `GetWebSocketsToken` token.
    pub fn requires_auth(&self) -> bool {
        matches!(self, Channel::Orders)
    }

    /// Whether a recorder feed can be built for this channel.
    pub fn is_recordable(&self) -> bool {
        !matches!(self, Channel::Status | Channel::Heartbeat)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::from_wire(s.trim()).ok_or_else(|| format!("unknown channel {s:?}"))
    }
}

/// The `type` field of a channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Snapshot,
    Update,
}

/// A `subscribe` request sent to the Kraken WebSocket API.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub method: String,
    pub params: Params,
}

impl SubscribeRequest {
    pub fn new(params: Params) -> Self {
        Self {
            method: "subscribe".to_string(),
            params,
        }
    }
}

/// An `unsubscribe` request sent to the Kraken WebSocket API.
#[derive(Debug, Serialize)]
pub struct UnsubscribeRequest {
    pub method: String,
    pub params: Params,
}

impl UnsubscribeRequest {
    pub fn new(params: Params) -> Self {
        Self {
            method: "unsubscribe".to_string(),
            params,
        }
    }
}

/// Channel and symbol parameters used in subscribe/unsubscribe requests.
///
/// Optional fields are omitted from the wire format when unset, so the
/// same struct serves every channel.
#[derive(Debug, Clone, Serialize)]
pub struct Params {
    pub channel: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub symbol: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Params {
    pub fn new(channel: Channel, symbols: &[String]) -> Self {
        Self {
            channel: channel.as_str().to_string(),
            symbol: symbols.to_vec(),
            depth: None,
            interval: None,
            snapshot: None,
            token: None,
        }
    }

    #[must_use]
    pub fn with_depth(mut self, depth: book::BookDepth) -> Self {
        self.depth = Some(depth.as_u16());
        self
    }

    #[must_use]
    pub fn with_interval(mut self, minutes: u32) -> Self {
        self.interval = Some(minutes);
        self
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// A `ping` request used to test connection liveness.
#[derive(Debug, Serialize)]
pub struct PingRequest {
    pub method: String,
}

impl PingRequest {
    pub fn new() -> Self {
        Self {
            method: "ping".to_string(),
        }
    }
}

impl Default for PingRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Server response to a [`PingRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct PongResponse {
    pub method: String,
    #[serde(default)]
    pub time_in: String,
    #[serde(default)]
    pub time_out: String,
}

/// Acknowledgement of a `subscribe`/`unsubscribe` request.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodResponse {
    pub method: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Periodic heartbeat message indicating the connection is alive.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatResponse {
    pub channel: String,
}

/// System status update broadcast on the `status` channel.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateResponse {
    pub channel: String,
    #[serde(rename = "type")]
    pub tpe: MessageKind,
    pub data: Vec<StatusData>,
}

/// Detailed system status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub api_version: String,
    pub connection_id: u64,
    pub system: String,
    pub version: String,
}
