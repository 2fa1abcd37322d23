//! Crate-level error types.
//!
//! [`TapeError`] unifies every error source (configuration, WebSocket,
//! HTTP, JSON, order book, storage) behind a single enum so callers can
//! match on the variant they care about while still using `?` for
//! propagation. The book and writer subsystems keep their own enums
//! ([`BookError`], [`WriterError`]) because their callers branch on the
//! specific failure.

use rust_decimal::Decimal;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TapeError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum TapeError {
    /// An environment variable held an invalid value or credentials were
    /// only partially configured.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A REST request (token retrieval) failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame or REST response was missing a required field.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Kraken rejected the request signature or credentials.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The peer closed the connection or the stream ended.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// A feed thread could not be started or was lost.
    #[error("feed error: {0}")]
    Feed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Book(#[from] BookError),

    #[error(transparent)]
    Writer(#[from] WriterError),
}

/// Book side, used for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Returns the lowercase label used in logs and L3 rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures raised while applying book snapshots and updates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    /// A snapshot did not carry exactly `depth` levels on a side.
    #[error("{symbol}: snapshot {side} side has {got} levels, expected {expected}")]
    ProtocolViolation {
        symbol: String,
        side: Side,
        expected: usize,
        got: usize,
    },

    /// An update broke a structural book invariant.
    #[error("{symbol}: {reason} ({side} @ {price})")]
    InvariantViolation {
        symbol: String,
        side: Side,
        price: Decimal,
        reason: &'static str,
    },

    /// The locally computed CRC-32 disagrees with the exchange digest.
    #[error("{symbol}: checksum mismatch (local {local}, exchange {remote})")]
    ChecksumMismatch {
        symbol: String,
        local: u32,
        remote: u32,
    },

    /// A side dropped below the subscribed depth.
    #[error("{symbol}: {side} side shrank to {got} levels, below depth {depth}")]
    DepthUnderflow {
        symbol: String,
        side: Side,
        depth: usize,
        got: usize,
    },

    /// An update arrived for a symbol without a valid snapshot.
    #[error("{symbol}: book is not synced")]
    NotSynced { symbol: String },
}

impl BookError {
    /// Whether the error leaves the symbol desynced and requires a fresh
    /// snapshot.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            BookError::ProtocolViolation { .. }
                | BookError::InvariantViolation { .. }
                | BookError::DepthUnderflow { .. }
        )
    }
}

/// Failures raised by the batched writer and its storage backends.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// The configured output mode cannot serve this channel.
    #[error("output mode {mode} is not supported for channel {channel}")]
    UnsupportedOutputMode {
        channel: &'static str,
        mode: &'static str,
    },

    /// A bounded queue is full and the overflow policy is `Fail`.
    #[error("writer queue is full ({capacity} payloads)")]
    QueueFull { capacity: usize },

    /// The writer has already been asked to stop.
    #[error("writer queue is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A payload row did not match its table schema.
    #[error("row has {got} fields, table {table} expects {expected}")]
    RowShape {
        table: String,
        expected: usize,
        got: usize,
    },

    /// A field would break the comma-delimited row files.
    #[error("field {field:?} in table {table} contains a delimiter")]
    Delimiter { table: String, field: String },
}
