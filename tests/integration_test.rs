//! Live tests against the public Kraken WebSocket V2 API.
//!
//! These tests require network access.
//! Run with: `cargo test --features integration-tests`

#![cfg(feature = "integration-tests")]

mod common;

use kraken_tape::book::{BookManager, ChecksumPolicy, SyncState};
use kraken_tape::decoder::{Inbound, decode};
use kraken_tape::models::book::BookDepth;
use kraken_tape::models::{Channel, Params};
use kraken_tape::websocket::{close, connect, ping, subscribe, unsubscribe};

use common::{KRAKEN_WS_URL, wait_for};

#[tokio::test]
async fn test_ping_pong() {
    let (mut write, mut read) = connect(KRAKEN_WS_URL).await.expect("Failed to connect");
    ping(&mut write).await.expect("Failed to send ping");

    let pong = wait_for(&mut read, "\"method\":\"pong\"", 5).await;
    assert!(pong.is_some(), "Did not receive pong response");
    close(&mut write).await.expect("Failed to close");
}

#[tokio::test]
async fn test_subscribe_and_receive_ticker() {
    let (mut write, mut read) = connect(KRAKEN_WS_URL).await.expect("Failed to connect");
    let symbols = vec!["BTC/USD".to_string()];

    subscribe(&mut write, Params::new(Channel::Ticker, &symbols))
        .await
        .expect("Failed to subscribe to ticker");

    let frame = wait_for(&mut read, "\"channel\":\"ticker\"", 10)
        .await
        .expect("Did not receive ticker message");
    assert!(matches!(decode(&frame), Ok(Inbound::Ticker(_))));

    unsubscribe(&mut write, Params::new(Channel::Ticker, &symbols))
        .await
        .expect("Failed to unsubscribe from ticker");
}

#[tokio::test]
async fn test_live_book_snapshot_matches_exchange_checksum() {
    let (mut write, mut read) = connect(KRAKEN_WS_URL).await.expect("Failed to connect");
    let symbols = vec!["BTC/USD".to_string()];

    subscribe(
        &mut write,
        Params::new(Channel::Book, &symbols).with_depth(BookDepth::D10),
    )
    .await
    .expect("Failed to subscribe to book");

    let frame = wait_for(&mut read, "\"type\":\"snapshot\"", 10)
        .await
        .expect("Did not receive book snapshot");
    let Ok(Inbound::Book(response)) = decode(&frame) else {
        panic!("snapshot frame did not decode as book");
    };

    let mut books = BookManager::new(BookDepth::D10, ChecksumPolicy::Fatal);
    for data in &response.data {
        books
            .apply_snapshot(&data.symbol, &data.bids, &data.asks, data.checksum)
            .expect("Live snapshot failed verification");
        assert_eq!(books.state(&data.symbol), SyncState::Synced);
    }

    close(&mut write).await.expect("Failed to close");
}
