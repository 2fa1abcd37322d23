//! Checksum-verified L2 order books.
//!
//! [`BookManager`] owns one [`OrderBook`] per symbol in an arena indexed by
//! [`SymbolId`]. It applies `book` channel snapshots and incremental updates
//! while enforcing:
//!
//! - strict price ordering on both sides (structural, via `BTreeMap`);
//! - at most `depth` levels per side, trimming the worst levels on overflow;
//! - exactly `depth` levels after every update (fewer is a desync);
//! - no removal of an unknown price unless the update also adds a new one;
//! - best bid strictly below best ask.
//!
//! Any broken invariant marks the symbol [`SyncState::Desynced`] until a new
//! snapshot arrives. Checksum mismatches are governed by [`ChecksumPolicy`].

pub mod checksum;
mod order_book;
pub mod symbols;

use std::str::FromStr;

use tracing::{debug, error, warn};

pub use order_book::{OrderBook, SyncState};
pub use symbols::{SymbolId, SymbolTable};

use crate::error::{BookError, Side};
use crate::models::book::{BookDepth, PriceLevel};

/// Decimal places used when rendering book rows for storage.
pub const OUTPUT_PRECISION: usize = 9;

/// What to do when a snapshot digest disagrees with the exchange checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Report the mismatch, count it, and keep the book synced.
    #[default]
    Flag,
    /// Report the mismatch and desync the symbol.
    Fatal,
}

impl FromStr for ChecksumPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flag" => Ok(ChecksumPolicy::Flag),
            "fatal" => Ok(ChecksumPolicy::Fatal),
            other => Err(format!("unknown checksum policy {other:?}, expected flag or fatal")),
        }
    }
}

/// One rendered book row: the exchange timestamp followed by
/// `ask_px, ask_sz, bid_px, bid_sz` for each level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLine {
    pub symbol: String,
    pub timestamp: String,
    pub levels: Vec<String>,
}

impl BookLine {
    /// Row without the symbol column, as stored in per-symbol files.
    pub fn into_fields(self) -> Vec<String> {
        let mut fields = Vec::with_capacity(self.levels.len() + 1);
        fields.push(self.timestamp);
        fields.extend(self.levels);
        fields
    }
}

/// Per-symbol L2 books for one `book` subscription.
#[derive(Debug)]
pub struct BookManager {
    symbols: SymbolTable,
    books: Vec<OrderBook>,
    depth: BookDepth,
    policy: ChecksumPolicy,
    checksum_mismatches: u64,
}

impl BookManager {
    pub fn new(depth: BookDepth, policy: ChecksumPolicy) -> Self {
        Self {
            symbols: SymbolTable::new(),
            books: Vec::new(),
            depth,
            policy,
            checksum_mismatches: 0,
        }
    }

    pub fn depth(&self) -> BookDepth {
        self.depth
    }

    pub fn policy(&self) -> ChecksumPolicy {
        self.policy
    }

    /// Checksum mismatches seen so far across all symbols.
    pub fn checksum_mismatches(&self) -> u64 {
        self.checksum_mismatches
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn book(&self, symbol: &str) -> Option<&OrderBook> {
        self.symbols
            .get(symbol)
            .map(|id| &self.books[id.index()])
    }

    pub fn book_by_id(&self, id: SymbolId) -> &OrderBook {
        &self.books[id.index()]
    }

    /// Sync state of `symbol`; unknown symbols are uninitialized.
    pub fn state(&self, symbol: &str) -> SyncState {
        self.book(symbol)
            .map_or(SyncState::Uninitialized, OrderBook::state)
    }

    /// Interns `symbol`, creating an empty book on first sighting.
    pub fn intern(&mut self, symbol: &str) -> SymbolId {
        let id = self.symbols.intern(symbol);
        if id.index() >= self.books.len() {
            self.books.push(OrderBook::new());
        }
        id
    }

    /// Records the exchange timestamp carried by the latest message.
    pub fn stamp(&mut self, symbol: &str, timestamp: &str) {
        let id = self.intern(symbol);
        self.books[id.index()].set_timestamp(timestamp);
    }

    /// Replaces the book for `symbol` and verifies the exchange checksum.
    ///
    /// # Errors
    ///
    /// - [`BookError::ProtocolViolation`] if either side does not carry
    ///   exactly `depth` levels; the symbol is desynced.
    /// - [`BookError::ChecksumMismatch`] if the local digest disagrees. The
    ///   book stays synced under [`ChecksumPolicy::Flag`] and is desynced
    ///   under [`ChecksumPolicy::Fatal`].
    pub fn apply_snapshot(
        &mut self,
        symbol: &str,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
        checksum: u32,
    ) -> Result<(), BookError> {
        let id = self.intern(symbol);
        let depth = self.depth.as_usize();

        for (side, got) in [(Side::Bid, bids.len()), (Side::Ask, asks.len())] {
            if got != depth {
                self.books[id.index()].set_state(SyncState::Desynced);
                let err = BookError::ProtocolViolation {
                    symbol: symbol.to_string(),
                    side,
                    expected: depth,
                    got,
                };
                error!(symbol, side = side.as_str(), got, depth, "Snapshot size mismatch");
                return Err(err);
            }
        }

        let book = &mut self.books[id.index()];
        book.replace(bids, asks);
        book.set_state(SyncState::Synced);
        self.reconcile(id, symbol, checksum)?;

        debug!(symbol, depth, "Applied book snapshot");
        Ok(())
    }

    /// Applies an incremental update to a synced book.
    ///
    /// Both sides are validated before either is mutated. Each side then
    /// applies its deltas in message order, trims to `depth`, and must end
    /// with exactly `depth` levels.
    ///
    /// # Errors
    ///
    /// - [`BookError::NotSynced`] if the symbol has no valid snapshot; the
    ///   update is ignored.
    /// - [`BookError::InvariantViolation`] for a removal without
    ///   replacement or a crossed book.
    /// - [`BookError::DepthUnderflow`] if a side ends below `depth`.
    ///
    /// The last two desync the symbol.
    pub fn apply_update(
        &mut self,
        symbol: &str,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
    ) -> Result<(), BookError> {
        let Some(id) = self.symbols.get(symbol) else {
            return Err(BookError::NotSynced {
                symbol: symbol.to_string(),
            });
        };
        let depth = self.depth.as_usize();
        let book = &mut self.books[id.index()];
        if book.state() != SyncState::Synced {
            return Err(BookError::NotSynced {
                symbol: symbol.to_string(),
            });
        }

        for (side, deltas) in [(Side::Bid, bids), (Side::Ask, asks)] {
            if let Err(orphan) = book.validate_deltas(side, deltas) {
                book.set_state(SyncState::Desynced);
                error!(
                    symbol,
                    side = side.as_str(),
                    price = %orphan.price,
                    "Removal without replacement"
                );
                return Err(BookError::InvariantViolation {
                    symbol: symbol.to_string(),
                    side,
                    price: orphan.price,
                    reason: "removal without replacement",
                });
            }
        }

        for (side, deltas) in [(Side::Bid, bids), (Side::Ask, asks)] {
            if deltas.is_empty() {
                continue;
            }
            let len = book.apply_deltas(side, deltas, depth);
            if len < depth {
                book.set_state(SyncState::Desynced);
                error!(symbol, side = side.as_str(), len, depth, "Book depth underflow");
                return Err(BookError::DepthUnderflow {
                    symbol: symbol.to_string(),
                    side,
                    depth,
                    got: len,
                });
            }
        }

        if let Some(price) = book.crossed_at() {
            book.set_state(SyncState::Desynced);
            error!(symbol, side = "bid", price = %price, "Crossed book");
            return Err(BookError::InvariantViolation {
                symbol: symbol.to_string(),
                side: Side::Bid,
                price,
                reason: "crossed book",
            });
        }

        Ok(())
    }

    /// Compares the digest of a synced book with the checksum carried by an
    /// update, applying the [`ChecksumPolicy`] on mismatch.
    ///
    /// # Errors
    ///
    /// - [`BookError::NotSynced`] unless the symbol is synced.
    /// - [`BookError::ChecksumMismatch`] if the digests differ.
    pub fn check_checksum(&mut self, symbol: &str, remote: u32) -> Result<(), BookError> {
        let id = self
            .symbols
            .get(symbol)
            .filter(|id| self.books[id.index()].state() == SyncState::Synced)
            .ok_or_else(|| BookError::NotSynced {
                symbol: symbol.to_string(),
            })?;
        self.reconcile(id, symbol, remote)
    }

    fn reconcile(&mut self, id: SymbolId, symbol: &str, remote: u32) -> Result<(), BookError> {
        let book = &mut self.books[id.index()];
        let local = book.checksum();
        if local == remote {
            return Ok(());
        }

        self.checksum_mismatches += 1;
        if self.policy == ChecksumPolicy::Fatal {
            book.set_state(SyncState::Desynced);
        }
        warn!(
            symbol,
            local,
            remote,
            policy = ?self.policy,
            "Book checksum mismatch"
        );
        Err(BookError::ChecksumMismatch {
            symbol: symbol.to_string(),
            local,
            remote,
        })
    }

    /// Compares the current digest for `symbol` with `external` without
    /// mutating anything. Unknown symbols never verify.
    pub fn verify_checksum(&self, symbol: &str, external: u32) -> bool {
        self.book(symbol)
            .is_some_and(|book| book.checksum() == external)
    }

    /// Renders the top `depth` levels of a synced book.
    ///
    /// # Errors
    ///
    /// Returns [`BookError::NotSynced`] unless the symbol is synced.
    pub fn snapshot_for_output(&self, symbol: &str) -> Result<BookLine, BookError> {
        let book = self
            .book(symbol)
            .filter(|book| book.state() == SyncState::Synced)
            .ok_or_else(|| BookError::NotSynced {
                symbol: symbol.to_string(),
            })?;

        let depth = self.depth.as_usize();
        let prec = OUTPUT_PRECISION;
        let mut levels = Vec::with_capacity(depth * 4);
        for ((ask_px, ask_sz), (bid_px, bid_sz)) in book.asks().zip(book.bids()).take(depth) {
            levels.push(format!("{ask_px:.prec$}"));
            levels.push(format!("{ask_sz:.prec$}"));
            levels.push(format!("{bid_px:.prec$}"));
            levels.push(format!("{bid_sz:.prec$}"));
        }

        Ok(BookLine {
            symbol: symbol.to_string(),
            timestamp: book.timestamp().to_string(),
            levels,
        })
    }
}
