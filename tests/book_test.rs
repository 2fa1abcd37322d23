//! End-to-end order book reconstruction from recorded `book` frames.

use rust_decimal_macros::dec;

use kraken_tape::book::{BookManager, ChecksumPolicy, SyncState};
use kraken_tape::decoder::{Inbound, decode};
use kraken_tape::error::BookError;
use kraken_tape::models::book::{BookData, BookDepth, PriceLevel};

const SNAPSHOT_JSON: &str = include_str!("fixtures/book_snapshot.json");
const UPDATE_JSON: &str = include_str!("fixtures/book_update.json");

const SYMBOL: &str = "BTC/USD";

fn book_data(text: &str) -> BookData {
    let Inbound::Book(response) = decode(text).expect("fixture decodes") else {
        panic!("expected book frame");
    };
    response.data.into_iter().next().expect("one symbol")
}

fn synced(policy: ChecksumPolicy) -> BookManager {
    let snapshot = book_data(SNAPSHOT_JSON);
    let mut books = BookManager::new(BookDepth::D10, policy);
    books
        .apply_snapshot(SYMBOL, &snapshot.bids, &snapshot.asks, snapshot.checksum)
        .expect("snapshot applies");
    books
}

fn level(price: rust_decimal::Decimal, qty: rust_decimal::Decimal) -> PriceLevel {
    PriceLevel::new(price, qty)
}

#[test]
fn test_snapshot_syncs_and_verifies() {
    let books = synced(ChecksumPolicy::Fatal);
    assert_eq!(books.state(SYMBOL), SyncState::Synced);
    assert!(books.verify_checksum(SYMBOL, 4293188607));
    assert!(!books.verify_checksum(SYMBOL, 1));
    assert!(!books.verify_checksum("ETH/USD", 4293188607));
    assert_eq!(books.checksum_mismatches(), 0);
}

#[test]
fn test_update_matches_exchange_checksum() {
    let mut books = synced(ChecksumPolicy::Fatal);
    let update = book_data(UPDATE_JSON);

    books.apply_update(SYMBOL, &update.bids, &update.asks).unwrap();
    books.check_checksum(SYMBOL, update.checksum).unwrap();

    let book = books.book(SYMBOL).unwrap();
    assert_eq!(book.bid_len(), 10);
    assert_eq!(book.ask_len(), 10);
    assert_eq!(book.best_bid(), Some(level(dec!(100.0), dec!(5))));
    assert_eq!(book.best_ask(), Some(level(dec!(101.0), dec!(7))));
    assert_eq!(book.checksum(), 1805654929);
}

#[test]
fn test_sides_stay_strictly_ordered() {
    let mut books = synced(ChecksumPolicy::Flag);
    let update = book_data(UPDATE_JSON);
    books.apply_update(SYMBOL, &update.bids, &update.asks).unwrap();

    let book = books.book(SYMBOL).unwrap();
    let bids: Vec<_> = book.bids().map(|(price, _)| *price).collect();
    let asks: Vec<_> = book.asks().map(|(price, _)| *price).collect();
    assert!(bids.windows(2).all(|w| w[0] > w[1]));
    assert!(asks.windows(2).all(|w| w[0] < w[1]));
    assert!(bids[0] < asks[0]);
}

#[test]
fn test_overflow_trims_worst_level() {
    let mut books = synced(ChecksumPolicy::Flag);
    books
        .apply_update(SYMBOL, &[level(dec!(100.75), dec!(1))], &[])
        .unwrap();

    let book = books.book(SYMBOL).unwrap();
    assert_eq!(book.bid_len(), 10);
    assert_eq!(book.best_bid().unwrap().price, dec!(100.75));
    assert!(book.bids().all(|(price, _)| *price != dec!(96.0)));
}

#[test]
fn test_depth_underflow_desyncs_until_next_snapshot() {
    let mut books = synced(ChecksumPolicy::Flag);
    let err = books
        .apply_update(SYMBOL, &[level(dec!(100.5), dec!(0))], &[])
        .unwrap_err();
    assert!(matches!(err, BookError::DepthUnderflow { got: 9, .. }));
    assert!(err.requires_resync());
    assert_eq!(books.state(SYMBOL), SyncState::Desynced);

    let ignored = books
        .apply_update(SYMBOL, &[level(dec!(100.75), dec!(1))], &[])
        .unwrap_err();
    assert!(matches!(ignored, BookError::NotSynced { .. }));
    assert!(books.snapshot_for_output(SYMBOL).is_err());

    let snapshot = book_data(SNAPSHOT_JSON);
    books
        .apply_snapshot(SYMBOL, &snapshot.bids, &snapshot.asks, snapshot.checksum)
        .unwrap();
    assert_eq!(books.state(SYMBOL), SyncState::Synced);
}

#[test]
fn test_crossing_update_is_rejected() {
    let mut books = synced(ChecksumPolicy::Flag);
    let err = books
        .apply_update(SYMBOL, &[level(dec!(101.0), dec!(1))], &[])
        .unwrap_err();
    assert!(matches!(
        err,
        BookError::InvariantViolation { reason: "crossed book", .. }
    ));
    assert_eq!(books.state(SYMBOL), SyncState::Desynced);
}

#[test]
fn test_short_snapshot_is_a_protocol_violation() {
    let snapshot = book_data(SNAPSHOT_JSON);
    let mut books = BookManager::new(BookDepth::D10, ChecksumPolicy::Flag);
    let err = books
        .apply_snapshot(SYMBOL, &snapshot.bids[..9], &snapshot.asks, snapshot.checksum)
        .unwrap_err();
    assert!(matches!(err, BookError::ProtocolViolation { expected: 10, got: 9, .. }));
    assert_eq!(books.state(SYMBOL), SyncState::Desynced);
}

#[test]
fn test_checksum_policy_decides_sync_state() {
    let snapshot = book_data(SNAPSHOT_JSON);

    let mut flagged = BookManager::new(BookDepth::D10, ChecksumPolicy::Flag);
    let err = flagged
        .apply_snapshot(SYMBOL, &snapshot.bids, &snapshot.asks, 1)
        .unwrap_err();
    assert!(matches!(err, BookError::ChecksumMismatch { local: 4293188607, remote: 1, .. }));
    assert_eq!(flagged.state(SYMBOL), SyncState::Synced);
    assert_eq!(flagged.checksum_mismatches(), 1);

    let mut fatal = BookManager::new(BookDepth::D10, ChecksumPolicy::Fatal);
    fatal
        .apply_snapshot(SYMBOL, &snapshot.bids, &snapshot.asks, 1)
        .unwrap_err();
    assert_eq!(fatal.state(SYMBOL), SyncState::Desynced);
}

#[test]
fn test_output_line_interleaves_sides() {
    let mut books = synced(ChecksumPolicy::Flag);
    books.stamp(SYMBOL, "2024-10-11T01:20:09.952961Z");

    let line = books.snapshot_for_output(SYMBOL).unwrap();
    assert_eq!(line.symbol, SYMBOL);
    assert_eq!(line.timestamp, "2024-10-11T01:20:09.952961Z");
    assert_eq!(line.levels.len(), 40);
    assert_eq!(
        &line.levels[..4],
        &["101.000000000", "7.000000000", "100.500000000", "10.000000000"]
    );
}
