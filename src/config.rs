//! Application configuration loaded from environment variables.
//!
//! Credentials are optional and only needed for the `level3` feed:
//! - `KRAKEN_API_KEY`: API key for Kraken authentication
//! - `KRAKEN_API_SECRET`: API secret for Kraken authentication
//!
//! Everything else has a default; see [`fetch_config`] for the full list.
//! Every struct here implements [`Default`] so library users can build a
//! configuration in code instead of through the environment.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::TapeError;
use crate::book::ChecksumPolicy;
use crate::models::Channel;
use crate::models::book::BookDepth;
use crate::models::candle::VALID_INTERVALS;
use crate::writer::{OutputMode, OverflowPolicy, WriterChannel, WriterConfig};

/// Default public WebSocket endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://ws.kraken.com/v2";

/// Default authenticated WebSocket endpoint.
const DEFAULT_AUTH_WEBSOCKET_URL: &str = "wss://ws-auth.kraken.com/v2";

/// Top-level application configuration.
#[derive(Debug, Default)]
pub struct AppConfig {
    pub kraken: KrakenConfig,
    pub recorder: RecorderConfig,
}

/// Kraken-specific configuration values.
pub struct KrakenConfig {
    pub websocket_url: String,
    pub auth_websocket_url: String,
    pub api_key: Option<Zeroizing<String>>,
    pub api_secret: Option<Zeroizing<String>>,
}

impl Default for KrakenConfig {
    fn default() -> Self {
        Self {
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            auth_websocket_url: DEFAULT_AUTH_WEBSOCKET_URL.to_string(),
            api_key: None,
            api_secret: None,
        }
    }
}

impl fmt::Debug for KrakenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KrakenConfig")
            .field("websocket_url", &self.websocket_url)
            .field("auth_websocket_url", &self.auth_websocket_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl KrakenConfig {
    /// Returns `(key, secret)` when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

/// What to record and where to put it.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub symbols: Vec<String>,
    /// One feed is built per channel listed here.
    pub feeds: Vec<Channel>,
    pub writer: WriterConfig,
    pub book: BookConfig,
    pub trades: TradesConfig,
    pub level3: Level3Config,
    pub ohlc: OhlcConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC/USD".to_string()],
            feeds: vec![Channel::Book, Channel::Trades],
            writer: WriterConfig::default(),
            book: BookConfig::default(),
            trades: TradesConfig::default(),
            level3: Level3Config::default(),
            ohlc: OhlcConfig::default(),
        }
    }
}

/// Settings for the `book` feed.
#[derive(Debug, Clone, Copy)]
pub struct BookConfig {
    pub depth: BookDepth,
    /// Emit book lines every N applied book frames.
    pub log_book_every: usize,
    pub checksum_policy: ChecksumPolicy,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            depth: BookDepth::D10,
            log_book_every: 1,
            checksum_policy: ChecksumPolicy::Flag,
        }
    }
}

/// Settings for the `trade` feed.
#[derive(Debug, Clone, Copy)]
pub struct TradesConfig {
    /// Flush once this many trades are buffered.
    pub log_trades_every: usize,
    /// Ask for the recent-trades snapshot on subscribe.
    pub snapshot: bool,
}

impl Default for TradesConfig {
    fn default() -> Self {
        Self {
            log_trades_every: 100,
            snapshot: true,
        }
    }
}

/// Settings for the `level3` feed.
#[derive(Debug, Clone)]
pub struct Level3Config {
    /// Flush once more than this many ticks are buffered.
    pub log_ticks_every: usize,
    /// File stem (or table name) for tick rows.
    pub out_file_name: String,
}

impl Default for Level3Config {
    fn default() -> Self {
        Self {
            log_ticks_every: 100,
            out_file_name: "L3_ticks".to_string(),
        }
    }
}

/// Settings for the `ohlc` feed.
#[derive(Debug, Clone, Copy)]
pub struct OhlcConfig {
    /// Bar length in minutes; one of [`VALID_INTERVALS`].
    pub interval: u32,
}

impl Default for OhlcConfig {
    fn default() -> Self {
        Self { interval: 5 }
    }
}

/// Loads the application configuration from environment variables.
///
/// | Variable | Default |
/// |---|---|
/// | `KRAKEN_WEBSOCKET_URL` | `wss://ws.kraken.com/v2` |
/// | `KRAKEN_AUTH_WEBSOCKET_URL` | `wss://ws-auth.kraken.com/v2` |
/// | `KRAKEN_API_KEY` / `KRAKEN_API_SECRET` | unset |
/// | `TAPE_SYMBOLS` | `BTC/USD` |
/// | `TAPE_FEEDS` | `book,trade` |
/// | `TAPE_OUTPUT_DIR` | `.` |
/// | `TAPE_OUTPUT_MODE` | `sql` |
/// | `TAPE_CHANNEL_MODES` | none, e.g. `L2=parquet,trades=csv` |
/// | `TAPE_DB_NAME` | `kracked_outputs.db` |
/// | `TAPE_BOOK_DEPTH` | `10` |
/// | `TAPE_LOG_BOOK_EVERY` | `1` |
/// | `TAPE_LOG_TRADES_EVERY` | `100` |
/// | `TAPE_LOG_TICKS_EVERY` | `100` |
/// | `TAPE_L3_FILE` | `L3_ticks` |
/// | `TAPE_OHLC_INTERVAL` | `5` |
/// | `TAPE_CONVERT_EVERY` | `1000` |
/// | `TAPE_QUEUE_CAPACITY` | unbounded |
/// | `TAPE_QUEUE_OVERFLOW` | `block` |
/// | `TAPE_CHECKSUM_POLICY` | `flag` |
///
/// Empty values are treated as unset.
///
/// # Errors
///
/// Returns [`TapeError::Config`] if only one of the two credential
/// variables is set, a value does not parse, or a value is out of range.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("KRAKEN_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
    let auth_websocket_url = non_empty_var("KRAKEN_AUTH_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_AUTH_WEBSOCKET_URL.to_string());

    let api_key = non_empty_var("KRAKEN_API_KEY").map(Zeroizing::new);
    let api_secret = non_empty_var("KRAKEN_API_SECRET").map(Zeroizing::new);

    match (&api_key, &api_secret) {
        (Some(_), None) => {
            return Err(TapeError::Config(
                "KRAKEN_API_KEY is set but KRAKEN_API_SECRET is missing".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(TapeError::Config(
                "KRAKEN_API_SECRET is set but KRAKEN_API_KEY is missing".to_string(),
            ));
        }
        _ => {}
    }

    Ok(AppConfig {
        kraken: KrakenConfig {
            websocket_url,
            auth_websocket_url,
            api_key,
            api_secret,
        },
        recorder: recorder_from_env()?,
    })
}

fn recorder_from_env() -> crate::Result<RecorderConfig> {
    let defaults = RecorderConfig::default();

    let symbols = non_empty_var("TAPE_SYMBOLS")
        .map(|raw| split_list(&raw))
        .unwrap_or(defaults.symbols);
    if symbols.is_empty() {
        return Err(TapeError::Config("TAPE_SYMBOLS lists no symbols".to_string()));
    }

    let feeds = match non_empty_var("TAPE_FEEDS") {
        Some(raw) => parse_feeds(&raw)?,
        None => defaults.feeds,
    };

    let writer = WriterConfig {
        output_dir: non_empty_var("TAPE_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.writer.output_dir),
        output_mode: parse_var("TAPE_OUTPUT_MODE", defaults.writer.output_mode)?,
        channel_modes: match non_empty_var("TAPE_CHANNEL_MODES") {
            Some(raw) => parse_channel_modes(&raw)?,
            None => HashMap::new(),
        },
        db_name: non_empty_var("TAPE_DB_NAME").unwrap_or(defaults.writer.db_name),
        convert_to_columnar_every: positive_var(
            "TAPE_CONVERT_EVERY",
            defaults.writer.convert_to_columnar_every,
        )?,
        queue_capacity: match non_empty_var("TAPE_QUEUE_CAPACITY") {
            Some(_) => Some(positive_var("TAPE_QUEUE_CAPACITY", 1)?),
            None => None,
        },
        overflow: parse_var("TAPE_QUEUE_OVERFLOW", defaults.writer.overflow)?,
    };

    let book = BookConfig {
        depth: parse_var("TAPE_BOOK_DEPTH", defaults.book.depth)?,
        log_book_every: positive_var("TAPE_LOG_BOOK_EVERY", defaults.book.log_book_every)?,
        checksum_policy: parse_var("TAPE_CHECKSUM_POLICY", defaults.book.checksum_policy)?,
    };

    let trades = TradesConfig {
        log_trades_every: positive_var("TAPE_LOG_TRADES_EVERY", defaults.trades.log_trades_every)?,
        ..defaults.trades
    };

    let level3 = Level3Config {
        log_ticks_every: positive_var("TAPE_LOG_TICKS_EVERY", defaults.level3.log_ticks_every)?,
        out_file_name: non_empty_var("TAPE_L3_FILE").unwrap_or(defaults.level3.out_file_name),
    };

    let interval: u32 = parse_var("TAPE_OHLC_INTERVAL", defaults.ohlc.interval)?;
    if !VALID_INTERVALS.contains(&interval) {
        return Err(TapeError::Config(format!(
            "TAPE_OHLC_INTERVAL={interval} is not one of {VALID_INTERVALS:?}"
        )));
    }

    Ok(RecorderConfig {
        symbols,
        feeds,
        writer,
        book,
        trades,
        level3,
        ohlc: OhlcConfig { interval },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_var<T>(name: &str, default: T) -> crate::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| TapeError::Config(format!("{name}: {e}"))),
        None => Ok(default),
    }
}

fn positive_var(name: &str, default: usize) -> crate::Result<usize> {
    let value: usize = parse_var(name, default)?;
    if value == 0 {
        return Err(TapeError::Config(format!("{name} must be at least 1")));
    }
    Ok(value)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_feeds(raw: &str) -> crate::Result<Vec<Channel>> {
    let mut feeds = Vec::new();
    for name in split_list(raw) {
        let channel: Channel = name
            .parse()
            .map_err(|e| TapeError::Config(format!("TAPE_FEEDS: {e}")))?;
        if !channel.is_recordable() {
            return Err(TapeError::Config(format!(
                "TAPE_FEEDS: {channel} cannot be recorded"
            )));
        }
        if !feeds.contains(&channel) {
            feeds.push(channel);
        }
    }
    Ok(feeds)
}

fn parse_channel_modes(raw: &str) -> crate::Result<HashMap<WriterChannel, OutputMode>> {
    let mut modes = HashMap::new();
    for entry in split_list(raw) {
        let (channel, mode) = entry.split_once('=').ok_or_else(|| {
            TapeError::Config(format!("TAPE_CHANNEL_MODES: expected CHANNEL=MODE, got {entry:?}"))
        })?;
        let channel = WriterChannel::parse(channel).ok_or_else(|| {
            TapeError::Config(format!("TAPE_CHANNEL_MODES: unknown channel {channel:?}"))
        })?;
        let mode: OutputMode = mode
            .parse()
            .map_err(|e| TapeError::Config(format!("TAPE_CHANNEL_MODES: {e}")))?;
        modes.insert(channel, mode);
    }
    Ok(modes)
}
