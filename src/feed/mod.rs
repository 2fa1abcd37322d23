//! Feed lifecycle: one WebSocket connection per channel handler, each on
//! its own thread.
//!
//! A [`Feed`] owns a boxed [`ChannelHandler`]. [`Feed::launch`] moves the
//! handler into a dedicated `feed-<name>` thread that runs a current-thread
//! tokio runtime: fetch a token if needed, connect, ping, subscribe, then
//! read frames until the handler closes the session, the connection drops,
//! or [`Feed::stop`] is called. The handler comes back on join, so only one
//! thread ever touches its state.

mod book;
mod instruments;
mod level3;
mod ohlc;
mod session;
mod ticker;
mod trades;

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use zeroize::Zeroizing;

pub use book::BookHandler;
pub use instruments::InstrumentsHandler;
pub use level3::Level3Handler;
pub use ohlc::OhlcHandler;
pub use ticker::TickerHandler;
pub use trades::TradesHandler;

use crate::config::{KrakenConfig, RecorderConfig};
use crate::decoder::Inbound;
use crate::models::{Channel, Params};
use crate::writer::{WriterConfig, WriterHandle, WriterPayload, spawn_writer};
use crate::{Result, TapeError};

/// Upper bound on every thread join.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// What the session loop should do after a handler processed a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Continue,
    /// Unsubscribe and resubscribe each symbol to obtain fresh snapshots.
    Resubscribe(Vec<String>),
    /// End the session cleanly.
    Close,
}

/// Channel-specific behaviour plugged into a [`Feed`].
pub trait ChannelHandler: Send + 'static {
    fn channel(&self) -> Channel;

    /// Name used for the feed thread and in logs.
    fn name(&self) -> &'static str {
        self.channel().as_str()
    }

    fn requires_auth(&self) -> bool {
        self.channel().requires_auth()
    }

    /// Subscribe requests sent right after connecting.
    fn subscriptions(&self, token: Option<&str>) -> Vec<Params>;

    /// Request parameters that re-arm a single symbol.
    fn resubscription(&self, symbol: &str, token: Option<&str>) -> Params {
        let mut params = Params::new(self.channel(), &[symbol.to_string()]);
        params.token = token.map(String::from);
        params
    }

    /// Processes one data frame. Control traffic (pong, acks, heartbeat,
    /// status, unknown channels) never reaches the handler.
    ///
    /// # Errors
    ///
    /// An error ends the session; the supervisor decides whether to retry.
    fn handle(&mut self, inbound: Inbound, writer: &WriterHandle) -> Result<Directive>;

    /// Flushes partial buffers when the session ends.
    fn on_shutdown(&mut self, _writer: &WriterHandle) {}
}

/// Builds the handler recording `channel`, or `None` for control channels.
pub fn build_handler(channel: Channel, config: &RecorderConfig) -> Option<Box<dyn ChannelHandler>> {
    let symbols = config.symbols.clone();
    let handler: Box<dyn ChannelHandler> = match channel {
        Channel::Book => Box::new(BookHandler::new(symbols, config.book)),
        Channel::Ticker => Box::new(TickerHandler::new(symbols)),
        Channel::Orders => Box::new(Level3Handler::new(symbols, config.level3.clone())),
        Channel::Candles => Box::new(OhlcHandler::new(symbols, config.ohlc)),
        Channel::Trades => Box::new(TradesHandler::new(symbols, config.trades)),
        Channel::Instruments => Box::new(InstrumentsHandler::new()),
        Channel::Status | Channel::Heartbeat => return None,
    };
    Some(handler)
}

/// API credentials held for token retrieval.
#[derive(Clone)]
pub struct Credentials {
    pub key: Zeroizing<String>,
    pub secret: Zeroizing<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Where and how a feed connects.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    /// Endpoint for handlers that require a token.
    pub auth_url: String,
    pub credentials: Option<Credentials>,
}

impl SessionConfig {
    pub fn from_kraken(kraken: &KrakenConfig) -> Self {
        Self {
            url: kraken.websocket_url.clone(),
            auth_url: kraken.auth_websocket_url.clone(),
            credentials: kraken.credentials().map(|(key, secret)| Credentials {
                key: Zeroizing::new(key.to_string()),
                secret: Zeroizing::new(secret.to_string()),
            }),
        }
    }
}

/// Reported by a feed thread when it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedExit {
    pub name: String,
    /// `None` for a clean exit.
    pub error: Option<String>,
}

#[derive(Debug)]
enum WriterSource {
    Shared(WriterHandle),
    /// The feed spawns and owns its writer.
    Standalone {
        config: WriterConfig,
        running: Option<(WriterHandle, JoinHandle<()>)>,
    },
}

/// A channel handler bound to its own connection thread.
pub struct Feed {
    name: String,
    session: SessionConfig,
    handler: Option<Box<dyn ChannelHandler>>,
    writer: WriterSource,
    exits: Option<mpsc::UnboundedSender<FeedExit>>,
    shutdown: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<Box<dyn ChannelHandler>>>,
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl Feed {
    /// A feed writing through a shared writer.
    pub fn new(handler: Box<dyn ChannelHandler>, session: SessionConfig, writer: WriterHandle) -> Self {
        Self::with_source(handler, session, WriterSource::Shared(writer))
    }

    /// A feed that spawns its own writer on launch and stops it on stop.
    pub fn standalone(
        handler: Box<dyn ChannelHandler>,
        session: SessionConfig,
        writer: WriterConfig,
    ) -> Self {
        Self::with_source(
            handler,
            session,
            WriterSource::Standalone {
                config: writer,
                running: None,
            },
        )
    }

    fn with_source(handler: Box<dyn ChannelHandler>, session: SessionConfig, writer: WriterSource) -> Self {
        Self {
            name: handler.name().to_string(),
            session,
            handler: Some(handler),
            writer,
            exits: None,
            shutdown: None,
            thread: None,
        }
    }

    /// Routes [`FeedExit`] events to a supervisor.
    #[must_use]
    pub fn with_exit_reporter(mut self, exits: mpsc::UnboundedSender<FeedExit>) -> Self {
        self.exits = Some(exits);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the feed thread is running.
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Whether the handler is available for a launch. It is lost only if
    /// the feed thread panicked or outlived its join bound.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some() || self.thread.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Replaces a lost handler.
    pub fn set_handler(&mut self, handler: Box<dyn ChannelHandler>) {
        self.handler = Some(handler);
    }

    /// Starts the feed thread. Does nothing if it is already running.
    ///
    /// # Errors
    ///
    /// - [`TapeError::Writer`] if a standalone writer cannot be spawned.
    /// - [`TapeError::Feed`] if the handler was lost.
    /// - [`TapeError::Io`] if the thread cannot be spawned.
    pub fn launch(&mut self) -> Result<()> {
        if self.is_alive() {
            return Ok(());
        }
        self.reap();

        let writer = match &mut self.writer {
            WriterSource::Shared(handle) => handle.clone(),
            WriterSource::Standalone { config, running } => {
                let live = running
                    .as_ref()
                    .filter(|(handle, _)| !handle.is_stopped())
                    .map(|(handle, _)| handle.clone());
                match live {
                    Some(handle) => handle,
                    None => {
                        let (handle, join) = spawn_writer(config)?;
                        *running = Some((handle.clone(), join));
                        handle
                    }
                }
            }
        };

        let handler = self
            .handler
            .take()
            .ok_or_else(|| TapeError::Feed(format!("{}: handler was lost", self.name)))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let name = self.name.clone();
        let session = self.session.clone();
        let exits = self.exits.clone();
        let thread = std::thread::Builder::new()
            .name(format!("feed-{}", self.name))
            .spawn(move || run_feed(name, handler, session, writer, shutdown_rx, exits))?;

        self.shutdown = Some(shutdown_tx);
        self.thread = Some(thread);
        info!(feed = %self.name, "Feed launched");
        Ok(())
    }

    /// Signals the feed thread to close its connection and flush, then
    /// joins it within [`JOIN_TIMEOUT`]. A standalone writer is stopped and
    /// joined the same way. Idempotent.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(thread) = self.thread.take() {
            match join_bounded(thread, JOIN_TIMEOUT) {
                Some(handler) => self.handler = Some(handler),
                None => warn!(feed = %self.name, "Feed thread did not stop in time"),
            }
            info!(feed = %self.name, "Feed stopped");
        }
        if let WriterSource::Standalone { running, .. } = &mut self.writer
            && let Some((handle, join)) = running.take()
        {
            handle.stop();
            if join_bounded(join, JOIN_TIMEOUT).is_none() {
                warn!(feed = %self.name, "Writer did not stop in time");
            }
        }
    }

    /// Joins a thread that already exited so its handler can be reused.
    fn reap(&mut self) {
        if self.thread.as_ref().is_some_and(JoinHandle::is_finished)
            && let Some(thread) = self.thread.take()
        {
            self.shutdown = None;
            match thread.join() {
                Ok(handler) => self.handler = Some(handler),
                Err(_) => error!(feed = %self.name, "Feed thread panicked"),
            }
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_feed(
    name: String,
    mut handler: Box<dyn ChannelHandler>,
    session: SessionConfig,
    writer: WriterHandle,
    mut shutdown: watch::Receiver<bool>,
    exits: Option<mpsc::UnboundedSender<FeedExit>>,
) -> Box<dyn ChannelHandler> {
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(TapeError::from)
        .and_then(|runtime| {
            runtime.block_on(session::run(handler.as_mut(), &session, &writer, &mut shutdown))
        });

    handler.on_shutdown(&writer);

    let error = match result {
        Ok(()) => {
            info!(feed = %name, "Session ended");
            None
        }
        Err(e) => {
            error!(feed = %name, error = %e, "Session failed");
            Some(e.to_string())
        }
    };
    if let Some(exits) = exits {
        let _ = exits.send(FeedExit { name, error });
    }
    handler
}

/// Joins `handle`, giving up after `timeout`. A thread still running at the
/// deadline is detached.
pub(crate) fn join_bounded<T>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    handle.join().ok()
}

/// Hands `payload` to the writer, logging rejections.
pub(crate) fn submit(writer: &WriterHandle, payload: WriterPayload) {
    let channel = payload.channel();
    if let Err(e) = writer.enqueue(payload) {
        warn!(channel = channel.as_str(), error = %e, "Payload rejected by writer");
    }
}

/// Receipt timestamp in the exchange's RFC 3339 format.
pub(crate) fn received_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_exist_for_recordable_channels() {
        let config = RecorderConfig::default();
        for channel in [
            Channel::Book,
            Channel::Ticker,
            Channel::Orders,
            Channel::Candles,
            Channel::Trades,
            Channel::Instruments,
        ] {
            let handler = build_handler(channel, &config).unwrap();
            assert_eq!(handler.channel(), channel);
        }
        assert!(build_handler(Channel::Heartbeat, &config).is_none());
    }

    #[test]
    fn join_bounded_gives_up_on_stuck_threads() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let stuck = std::thread::spawn(move || {
            let _ = rx.recv();
        });
        assert!(join_bounded(stuck, Duration::from_millis(50)).is_none());
        drop(tx);

        let quick = std::thread::spawn(|| 7);
        assert_eq!(join_bounded(quick, JOIN_TIMEOUT), Some(7));
    }

    #[test]
    fn failed_connect_reports_exit_and_returns_handler() {
        let (exits_tx, mut exits_rx) = mpsc::unbounded_channel();
        let session = SessionConfig {
            url: "ws://127.0.0.1:9".to_string(),
            auth_url: "ws://127.0.0.1:9".to_string(),
            credentials: None,
        };
        let handler = build_handler(Channel::Ticker, &RecorderConfig::default()).unwrap();
        let mut feed = Feed::new(handler, session, testing::writer()).with_exit_reporter(exits_tx);

        feed.launch().unwrap();
        let exit = exits_rx.blocking_recv().unwrap();
        assert_eq!(exit.name, "ticker");
        assert!(exit.error.is_some());

        feed.stop();
        assert!(!feed.is_alive());
        assert!(feed.has_handler());
    }

    #[test]
    fn level3_without_credentials_fails_before_connecting() {
        let (exits_tx, mut exits_rx) = mpsc::unbounded_channel();
        let session = SessionConfig {
            url: "ws://127.0.0.1:9".to_string(),
            auth_url: "ws://127.0.0.1:9".to_string(),
            credentials: None,
        };
        let handler = build_handler(Channel::Orders, &RecorderConfig::default()).unwrap();
        let mut feed = Feed::new(handler, session, testing::writer()).with_exit_reporter(exits_tx);

        feed.launch().unwrap();
        let exit = exits_rx.blocking_recv().unwrap();
        assert!(exit.error.unwrap().contains("authentication"));
    }
}
