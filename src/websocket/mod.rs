//! Async WebSocket plumbing for the Kraken WebSocket V2 API.
//!
//! - [`connect`] and [`ping`] open and probe a connection
//! - [`subscription`] sends subscribe/unsubscribe requests
//!
//! Reading and dispatching frames is the job of [`crate::feed`].

mod subscription;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use tungstenite::Message;

use crate::Result;
use crate::models::PingRequest;

pub use subscription::{subscribe, unsubscribe};

/// Write half of a Kraken WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a Kraken WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`TapeError`](crate::TapeError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!(url, "WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Sends a ping message over the WebSocket to test connection liveness.
///
/// # Errors
///
/// Returns a [`TapeError`](crate::TapeError) if sending the message fails.
pub async fn ping(write: &mut WsWriter) -> Result<()> {
    send_json(write, &PingRequest::new()).await?;
    debug!("Sent ping");

    Ok(())
}

/// Sends a close frame. The peer's close reply is not awaited.
///
/// # Errors
///
/// Returns a [`TapeError`](crate::TapeError) if the frame cannot be sent.
pub async fn close(write: &mut WsWriter) -> Result<()> {
    write.send(Message::Close(None)).await?;
    debug!("Sent close frame");

    Ok(())
}

async fn send_json<T: Serialize>(write: &mut WsWriter, request: &T) -> Result<()> {
    let json = serde_json::to_string(request)?;
    write.send(Message::Text(json.into())).await?;

    Ok(())
}
