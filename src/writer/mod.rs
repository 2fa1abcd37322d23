//! Batched storage writer.
//!
//! Feeds never touch storage. They push [`WriterPayload`]s onto one shared
//! FIFO queue through a [`WriterHandle`], and a single [`BatchedWriter`]
//! thread drains it and dispatches each payload to the backend configured
//! for its channel:
//!
//! - [`OutputMode::RowFile`]: append-only CSV files ([`RowFileBackend`])
//! - [`OutputMode::Columnar`]: Parquet datasets ([`ColumnarBackend`])
//! - [`OutputMode::Relational`]: SQLite tables ([`RelationalBackend`])
//!
//! A failed write is logged and skipped; the loop keeps serving the other
//! channels. Stopping enqueues a sentinel, so everything queued before it
//! is still written.

mod columnar;
mod payload;
mod queue;
mod relational;
mod row_file;
mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info, warn};

pub use columnar::ColumnarBackend;
pub use payload::{
    CandleMode, CandleRow, PerChannel, Record, TickRow, TickerRow, TradeRow, WriterChannel,
    WriterPayload,
};
pub use queue::OverflowPolicy;
pub use relational::RelationalBackend;
pub use row_file::RowFileBackend;
pub use schema::{Column, ColumnType, TableSchema};

use payload::to_fields;
use queue::{Message, PayloadQueue};

use crate::error::WriterError;

/// How long the writer waits on an empty queue before polling again.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Storage backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputMode {
    /// Append-only CSV.
    RowFile,
    /// Parquet partitions.
    Columnar,
    /// SQLite tables.
    #[default]
    Relational,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::RowFile => "csv",
            OutputMode::Columnar => "parquet",
            OutputMode::Relational => "sql",
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" | "rowfile" => Ok(OutputMode::RowFile),
            "parquet" | "columnar" => Ok(OutputMode::Columnar),
            "sql" | "sqlite" | "relational" => Ok(OutputMode::Relational),
            other => Err(format!("unknown output mode {other:?}, expected csv, parquet or sql")),
        }
    }
}

impl WriterChannel {
    /// Whether `mode` can store this channel.
    pub fn supports(&self, mode: OutputMode) -> bool {
        match self {
            WriterChannel::L2 | WriterChannel::L3 | WriterChannel::Trades => true,
            WriterChannel::L1 | WriterChannel::Ohlc => mode != OutputMode::Columnar,
            WriterChannel::Instruments => mode == OutputMode::RowFile,
        }
    }
}

/// How a batch relates to what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Add rows to the stream.
    Append,
    /// Add rows to a staging file that is periodically converted.
    Staged,
    /// Discard previous contents first.
    Replace,
}

/// Rows bound for one table or file.
#[derive(Debug)]
pub struct Batch<'a> {
    pub schema: &'a TableSchema,
    /// File stem for file backends; tables use the schema name.
    pub stem: &'a str,
    pub kind: BatchKind,
    pub rows: Vec<Vec<String>>,
}

/// A storage backend.
pub trait Backend {
    fn mode(&self) -> OutputMode;

    /// Persists `batch`.
    ///
    /// # Errors
    ///
    /// Returns the backend's I/O, SQLite, or Parquet failure.
    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), WriterError>;
}

/// Writer settings.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub output_dir: PathBuf,
    /// Default mode for every channel.
    pub output_mode: OutputMode,
    /// Per-channel overrides of `output_mode`.
    pub channel_modes: HashMap<WriterChannel, OutputMode>,
    /// SQLite file name inside `output_dir`.
    pub db_name: String,
    /// Book lines staged per symbol before a columnar conversion.
    pub convert_to_columnar_every: usize,
    /// `None` leaves the queue unbounded.
    pub queue_capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            output_mode: OutputMode::default(),
            channel_modes: HashMap::new(),
            db_name: "kracked_outputs.db".to_string(),
            convert_to_columnar_every: 1000,
            queue_capacity: None,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl WriterConfig {
    pub fn mode_for(&self, channel: WriterChannel) -> OutputMode {
        self.channel_modes
            .get(&channel)
            .copied()
            .unwrap_or(self.output_mode)
    }

    pub fn db_path(&self) -> PathBuf {
        self.output_dir.join(&self.db_name)
    }
}

/// Producer side of the writer queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    queue: Arc<PayloadQueue>,
}

impl WriterHandle {
    /// Queues `payload` for the writer.
    ///
    /// # Errors
    ///
    /// - [`WriterError::Closed`] once [`stop`](Self::stop) was called.
    /// - [`WriterError::QueueFull`] if the queue is bounded, full, and the
    ///   overflow policy is [`OverflowPolicy::Fail`].
    pub fn enqueue(&self, payload: WriterPayload) -> Result<(), WriterError> {
        self.queue.push(payload)
    }

    /// Enqueues the shutdown sentinel. Earlier payloads are still written.
    pub fn stop(&self) {
        self.queue.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.queue.is_closed()
    }

    /// Payloads waiting to be written.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Payloads evicted under [`OverflowPolicy::DropOldest`].
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    #[cfg(test)]
    pub(crate) fn next_payload(&self) -> Option<WriterPayload> {
        match self.queue.pop_timeout(Duration::ZERO) {
            Some(Message::Payload(payload)) => Some(payload),
            _ => None,
        }
    }
}

/// Single consumer of the payload queue; owns every storage handle.
#[derive(Debug)]
pub struct BatchedWriter {
    queue: Arc<PayloadQueue>,
    modes: PerChannel<OutputMode>,
    db_path: PathBuf,
    row_files: RowFileBackend,
    columnar: ColumnarBackend,
    relational: Option<RelationalBackend>,
    l2_schemas: HashMap<(usize, bool), TableSchema>,
}

impl BatchedWriter {
    /// Builds a writer and the handle producers use to reach it. Output
    /// modes are resolved here, once per channel.
    pub fn new(config: &WriterConfig) -> (Self, WriterHandle) {
        let queue = Arc::new(PayloadQueue::new(config.queue_capacity, config.overflow));
        let mut modes = PerChannel::splat(config.output_mode);
        for channel in WriterChannel::ALL {
            modes.set(channel, config.mode_for(channel));
        }

        let writer = Self {
            queue: Arc::clone(&queue),
            modes,
            db_path: config.db_path(),
            row_files: RowFileBackend::new(config.output_dir.clone()),
            columnar: ColumnarBackend::new(
                config.output_dir.clone(),
                config.convert_to_columnar_every,
            ),
            relational: None,
            l2_schemas: HashMap::new(),
        };
        (writer, WriterHandle { queue })
    }

    pub fn mode(&self, channel: WriterChannel) -> OutputMode {
        self.modes.get(channel)
    }

    /// Drains the queue until the shutdown sentinel arrives.
    pub fn run(mut self) {
        info!("Writer started");
        loop {
            match self.queue.pop_timeout(POLL_INTERVAL) {
                None => continue,
                Some(Message::Shutdown) => break,
                Some(Message::Payload(payload)) => {
                    let channel = payload.channel();
                    if let Err(e) = self.write(payload) {
                        error!(
                            channel = channel.as_str(),
                            mode = self.mode(channel).as_str(),
                            error = %e,
                            "Write failed, payload skipped"
                        );
                    }
                }
            }
        }
        info!("Writer stopped");
    }

    /// Writes one payload synchronously.
    ///
    /// # Errors
    ///
    /// - [`WriterError::UnsupportedOutputMode`] if the channel's mode cannot
    ///   store it.
    /// - [`WriterError::RowShape`] if a row does not match its table.
    /// - [`WriterError::Delimiter`] if a file-backed field holds a comma or
    ///   line break.
    /// - Any backend failure.
    pub fn write(&mut self, payload: WriterPayload) -> Result<(), WriterError> {
        let channel = payload.channel();
        let mode = self.modes.get(channel);
        if !channel.supports(mode) {
            return Err(WriterError::UnsupportedOutputMode {
                channel: channel.as_str(),
                mode: mode.as_str(),
            });
        }

        match payload {
            WriterPayload::Ticker(rows) => {
                self.emit(mode, &TableSchema::l1(), "L1", BatchKind::Append, to_fields(&rows))
            }
            WriterPayload::Book { line, depth } => {
                let with_symbol = mode == OutputMode::Relational;
                let schema = self
                    .l2_schemas
                    .entry((depth.as_usize(), with_symbol))
                    .or_insert_with(|| TableSchema::l2(depth.as_usize(), with_symbol))
                    .clone();
                if with_symbol {
                    let mut fields = vec![line.symbol.clone()];
                    fields.extend(line.into_fields());
                    self.emit(mode, &schema, "L2", BatchKind::Append, vec![fields])
                } else {
                    let stem = book_stem(&line.symbol);
                    self.emit(mode, &schema, &stem, BatchKind::Staged, vec![line.into_fields()])
                }
            }
            WriterPayload::Level3 {
                ticks,
                out_file_name,
            } => self.emit(
                mode,
                &TableSchema::l3(),
                &out_file_name,
                BatchKind::Append,
                to_fields(&ticks),
            ),
            WriterPayload::Candles { mode: bars, rows } => {
                let rows = match bars {
                    CandleMode::Update => to_fields(&live_bars(rows)),
                    CandleMode::Snapshot => to_fields(&rows),
                };
                self.emit(mode, &TableSchema::ohlc(), "OHLC", BatchKind::Append, rows)
            }
            WriterPayload::Trades(rows) => self.emit(
                mode,
                &TableSchema::trades(),
                "trades",
                BatchKind::Append,
                to_fields(&rows),
            ),
            WriterPayload::Instruments { pairs, assets } => {
                let pair_schema = TableSchema::pairs();
                self.emit(
                    mode,
                    &pair_schema,
                    pair_schema.name(),
                    BatchKind::Replace,
                    to_fields(&pairs),
                )?;
                let asset_schema = TableSchema::assets();
                self.emit(
                    mode,
                    &asset_schema,
                    asset_schema.name(),
                    BatchKind::Replace,
                    to_fields(&assets),
                )
            }
        }
    }

    fn emit(
        &mut self,
        mode: OutputMode,
        schema: &TableSchema,
        stem: &str,
        kind: BatchKind,
        rows: Vec<Vec<String>>,
    ) -> Result<(), WriterError> {
        if rows.is_empty() {
            return Ok(());
        }
        if let Some(row) = rows.iter().find(|row| row.len() != schema.width()) {
            return Err(WriterError::RowShape {
                table: schema.name().to_string(),
                expected: schema.width(),
                got: row.len(),
            });
        }
        if mode != OutputMode::Relational {
            let delimited = rows
                .iter()
                .flatten()
                .find(|field| field.contains([',', '\n', '\r']));
            if let Some(field) = delimited {
                return Err(WriterError::Delimiter {
                    table: schema.name().to_string(),
                    field: field.clone(),
                });
            }
        }

        let batch = Batch {
            schema,
            stem,
            kind,
            rows,
        };
        self.backend(mode)?.write_batch(&batch)
    }

    fn backend(&mut self, mode: OutputMode) -> Result<&mut dyn Backend, WriterError> {
        match mode {
            OutputMode::RowFile => Ok(&mut self.row_files),
            OutputMode::Columnar => Ok(&mut self.columnar),
            OutputMode::Relational => match &mut self.relational {
                Some(backend) => Ok(backend),
                slot @ None => Ok(slot.insert(RelationalBackend::new(self.db_path.clone())?)),
            },
        }
    }
}

/// Keeps the newest live bar per symbol, in first-seen order.
fn live_bars(rows: Vec<CandleRow>) -> Vec<CandleRow> {
    let received = rows.len();
    let mut latest: Vec<CandleRow> = Vec::with_capacity(received);
    for row in rows {
        match latest.iter_mut().find(|kept| kept.symbol == row.symbol) {
            Some(kept) => *kept = row,
            None => latest.push(row),
        }
    }
    if latest.len() < received {
        warn!(
            received,
            kept = latest.len(),
            "Discarded superseded live OHLC bars"
        );
    }
    latest
}

/// File stem for a symbol's book rows, e.g. `L2_BTC_USD_orderbook`.
pub fn book_stem(symbol: &str) -> String {
    format!("L2_{}_orderbook", symbol.replace('/', "_"))
}

/// Creates the output directory and runs a [`BatchedWriter`] on its own
/// thread.
///
/// # Errors
///
/// Returns [`WriterError::Io`] if the directory cannot be created or the
/// thread cannot be spawned.
pub fn spawn_writer(config: &WriterConfig) -> Result<(WriterHandle, JoinHandle<()>), WriterError> {
    std::fs::create_dir_all(&config.output_dir)?;
    let (writer, handle) = BatchedWriter::new(config);
    let join = std::thread::Builder::new()
        .name("kraken-tape-writer".to_string())
        .spawn(move || writer.run())?;
    info!(dir = %config.output_dir.display(), mode = config.output_mode.as_str(), "Spawned writer");
    Ok((handle, join))
}
