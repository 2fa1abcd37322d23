//! Feeds driven end to end against a local WebSocket server.

use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tungstenite::Message;

use kraken_tape::book::ChecksumPolicy;
use kraken_tape::config::BookConfig;
use kraken_tape::feed::{BookHandler, ChannelHandler, Feed, FeedExit, InstrumentsHandler, SessionConfig};
use kraken_tape::models::book::BookDepth;
use kraken_tape::writer::{OutputMode, WriterConfig, book_stem};

const INSTRUMENT_JSON: &str = include_str!("fixtures/instrument.json");
const BOOK_SNAPSHOT_JSON: &str = include_str!("fixtures/book_snapshot.json");
const BOOK_UPDATE_JSON: &str = include_str!("fixtures/book_update.json");

/// Accepts one connection, reads the ping and subscribe requests, replays
/// `frames`, then either closes or waits for the client to close.
async fn serve(frames: Vec<&'static str>, close_after: bool) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let mut requests = Vec::new();
        while requests.len() < 2 {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => requests.push(text.as_str().to_string()),
                Some(Ok(_)) => continue,
                _ => return requests,
            }
        }

        for frame in frames {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }
        if close_after {
            let _ = ws.close(None).await;
        }
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
        requests
    });
    (url, server)
}

fn session(url: String) -> SessionConfig {
    SessionConfig {
        auth_url: url.clone(),
        url,
        credentials: None,
    }
}

fn row_files(dir: &Path) -> WriterConfig {
    WriterConfig {
        output_dir: dir.to_path_buf(),
        output_mode: OutputMode::RowFile,
        ..WriterConfig::default()
    }
}

async fn next_exit(exits: &mut mpsc::UnboundedReceiver<FeedExit>) -> FeedExit {
    tokio::time::timeout(Duration::from_secs(10), exits.recv())
        .await
        .expect("feed exits in time")
        .expect("exit reported")
}

/// Stops the feed off the async workers; it joins threads.
async fn stop(mut feed: Feed) {
    tokio::task::spawn_blocking(move || feed.stop()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_instrument_feed_dumps_snapshot_and_exits_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let (url, server) = serve(vec![INSTRUMENT_JSON], false).await;
    let (tx, mut exits) = mpsc::unbounded_channel();

    let mut feed = Feed::standalone(Box::new(InstrumentsHandler::new()), session(url), row_files(dir.path()))
        .with_exit_reporter(tx);
    feed.launch().unwrap();

    let exit = next_exit(&mut exits).await;
    assert_eq!(exit.name, "instrument");
    assert_eq!(exit.error, None);
    stop(feed).await;

    let requests = server.await.unwrap();
    let ping: serde_json::Value = serde_json::from_str(&requests[0]).unwrap();
    let subscribe: serde_json::Value = serde_json::from_str(&requests[1]).unwrap();
    assert_eq!(ping["method"], "ping");
    assert_eq!(subscribe["method"], "subscribe");
    assert_eq!(subscribe["params"]["channel"], "instrument");
    assert_eq!(subscribe["params"]["snapshot"], true);
    assert!(subscribe["params"].get("symbol").is_none());

    let pairs = std::fs::read_to_string(dir.path().join("kraken_pairs.csv")).unwrap();
    let assets = std::fs::read_to_string(dir.path().join("kraken_assets.csv")).unwrap();
    assert_eq!(pairs.lines().count(), 2);
    assert_eq!(assets.lines().count(), 3);
    assert!(pairs.lines().nth(1).unwrap().starts_with("BTC/USD,BTC,USD,online"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_book_feed_records_lines_until_peer_disconnects() {
    let dir = tempfile::tempdir().unwrap();
    let (url, server) = serve(vec![BOOK_SNAPSHOT_JSON, BOOK_UPDATE_JSON], true).await;
    let (tx, mut exits) = mpsc::unbounded_channel();

    let handler = BookHandler::new(
        vec!["BTC/USD".to_string()],
        BookConfig {
            depth: BookDepth::D10,
            log_book_every: 1,
            checksum_policy: ChecksumPolicy::Fatal,
        },
    );
    assert_eq!(handler.name(), "book");
    let mut feed = Feed::standalone(Box::new(handler), session(url), row_files(dir.path()))
        .with_exit_reporter(tx);
    feed.launch().unwrap();

    let exit = next_exit(&mut exits).await;
    assert_eq!(exit.name, "book");
    assert!(exit.error.unwrap().contains("disconnected"));
    stop(feed).await;

    let requests = server.await.unwrap();
    let subscribe: serde_json::Value = serde_json::from_str(&requests[1]).unwrap();
    assert_eq!(subscribe["params"]["channel"], "book");
    assert_eq!(subscribe["params"]["depth"], 10);
    assert_eq!(subscribe["params"]["symbol"][0], "BTC/USD");

    let path = dir.path().join(format!("{}.csv", book_stem("BTC/USD")));
    let text = std::fs::read_to_string(path).unwrap();
    let rows: Vec<&str> = text.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("2024-10-11T01:20:09.952961Z,101.000000000,7.000000000,100.500000000"));
    assert!(rows[1].starts_with("2024-10-11T01:20:10.114302Z,101.000000000,7.000000000,100.000000000"));
}
