//! One connect/subscribe/read cycle for a feed.

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tungstenite::Message;

use super::{ChannelHandler, Directive, SessionConfig};
use crate::auth::get_websocket_token;
use crate::decoder::{Inbound, decode};
use crate::websocket::{WsWriter, close, connect, ping, subscribe, unsubscribe};
use crate::writer::WriterHandle;
use crate::{Result, TapeError};

/// Runs until the handler closes the session, shutdown is signalled, or
/// the connection fails.
pub(super) async fn run(
    handler: &mut dyn ChannelHandler,
    session: &SessionConfig,
    writer: &WriterHandle,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    if *shutdown.borrow() {
        return Ok(());
    }
    let feed = handler.name();

    let token = if handler.requires_auth() {
        let credentials = session.credentials.as_ref().ok_or_else(|| {
            TapeError::Auth(format!(
                "{feed} requires KRAKEN_API_KEY and KRAKEN_API_SECRET"
            ))
        })?;
        Some(get_websocket_token(&credentials.key, &credentials.secret).await?)
    } else {
        None
    };
    let url = if handler.requires_auth() {
        &session.auth_url
    } else {
        &session.url
    };

    info!(feed, url = %url, "Connecting");
    let (mut write, mut read) = connect(url).await?;
    ping(&mut write).await?;
    for params in handler.subscriptions(token.as_deref()) {
        subscribe(&mut write, params).await?;
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(feed, "Shutdown requested, closing connection");
                    let _ = close(&mut write).await;
                    return Ok(());
                }
            }
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map_or_else(|| "no reason".to_string(), |f| f.reason.to_string());
                        return Err(TapeError::Disconnected(reason));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(TapeError::Disconnected("stream ended".to_string())),
                };

                let Some(inbound) = control(feed, decode(&text)?) else {
                    continue;
                };
                match handler.handle(inbound, writer)? {
                    Directive::Continue => {}
                    Directive::Resubscribe(symbols) => {
                        for symbol in &symbols {
                            resubscribe(handler, &mut write, symbol, token.as_deref()).await?;
                        }
                    }
                    Directive::Close => {
                        info!(feed, "Handler finished, closing connection");
                        let _ = close(&mut write).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Logs control traffic and passes data frames through.
fn control(feed: &str, inbound: Inbound) -> Option<Inbound> {
    match inbound {
        Inbound::Pong(pong) => {
            debug!(feed, time_out = %pong.time_out, "Received pong");
            None
        }
        Inbound::Ack(ack) => {
            if ack.success {
                info!(feed, method = %ack.method, "Request acknowledged");
            } else {
                warn!(feed, method = %ack.method, error = ?ack.error, "Request rejected");
            }
            None
        }
        Inbound::Heartbeat => None,
        Inbound::Status(status) => {
            for data in &status.data {
                info!(feed, system = %data.system, api_version = %data.api_version, "Exchange status");
            }
            None
        }
        Inbound::Unknown { channel } => {
            warn!(feed, channel = %channel, "Ignoring frame from unknown channel");
            None
        }
        data => Some(data),
    }
}

async fn resubscribe(
    handler: &dyn ChannelHandler,
    write: &mut WsWriter,
    symbol: &str,
    token: Option<&str>,
) -> Result<()> {
    warn!(feed = handler.name(), symbol, "Resubscribing to recover book state");
    unsubscribe(write, handler.resubscription(symbol, token)).await?;
    subscribe(write, handler.resubscription(symbol, token)).await
}
