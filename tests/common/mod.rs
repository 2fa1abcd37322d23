//! Shared test utilities and constants.

use std::time::Duration;

use futures_util::StreamExt;
use kraken_tape::websocket::WsReader;
use tungstenite::Message;

/// Kraken WebSocket V2 public endpoint URL.
pub const KRAKEN_WS_URL: &str = "wss://ws.kraken.com/v2";

/// Reads frames until one contains `needle`, giving up after `secs`.
pub async fn wait_for(read: &mut WsReader, needle: &str, secs: u64) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(secs), async {
        while let Some(Ok(message)) = read.next().await {
            if let Message::Text(text) = message
                && text.as_str().contains(needle)
            {
                return Some(text.as_str().to_string());
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
