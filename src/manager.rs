//! Runs many feeds against one writer and keeps them alive.
//!
//! [`FeedManager`] owns the shared writer and one [`Feed`] per configured
//! channel. [`Supervisor`] drives a manager from async code: it starts
//! everything, receives [`FeedExit`] events, and relaunches failed feeds
//! under a [`RestartPolicy`] until shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::{AppConfig, RecorderConfig};
use crate::feed::{Feed, FeedExit, JOIN_TIMEOUT, SessionConfig, build_handler, join_bounded};
use crate::writer::{WriterHandle, spawn_writer};
use crate::{Result, TapeError};

/// Feeds sharing one writer and one symbol set.
#[derive(Debug)]
pub struct FeedManager {
    recorder: RecorderConfig,
    feeds: Vec<Feed>,
    writer: Option<(WriterHandle, JoinHandle<()>)>,
    session: SessionConfig,
    exits_tx: mpsc::UnboundedSender<FeedExit>,
    exits_rx: Option<mpsc::UnboundedReceiver<FeedExit>>,
}

impl FeedManager {
    pub fn new(config: &AppConfig) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            recorder: config.recorder.clone(),
            feeds: Vec::new(),
            writer: None,
            session: SessionConfig::from_kraken(&config.kraken),
            exits_tx,
            exits_rx: Some(exits_rx),
        }
    }

    /// Starts the writer, then every configured feed. Already running
    /// parts are left alone.
    ///
    /// # Errors
    ///
    /// Returns the first writer or feed launch failure.
    pub fn start_all(&mut self) -> Result<()> {
        let live = self
            .writer
            .as_ref()
            .filter(|(handle, _)| !handle.is_stopped())
            .map(|(handle, _)| handle.clone());
        let writer = match live {
            Some(handle) => handle,
            None => {
                let (handle, join) = spawn_writer(&self.recorder.writer)?;
                self.writer = Some((handle.clone(), join));
                self.feeds.clear();
                handle
            }
        };

        if self.feeds.is_empty() {
            for &channel in &self.recorder.feeds {
                let Some(handler) = build_handler(channel, &self.recorder) else {
                    continue;
                };
                let feed = Feed::new(handler, self.session.clone(), writer.clone())
                    .with_exit_reporter(self.exits_tx.clone());
                self.feeds.push(feed);
            }
        }

        for feed in &mut self.feeds {
            feed.launch()?;
        }
        info!(feeds = self.feeds.len(), "All feeds started");
        Ok(())
    }

    /// Stops every feed, then the writer, each within a bounded wait.
    pub fn stop_all(&mut self) {
        for feed in &mut self.feeds {
            feed.stop();
        }
        if let Some((handle, join)) = self.writer.take() {
            handle.stop();
            if handle.dropped() > 0 {
                warn!(dropped = handle.dropped(), "Writer queue dropped payloads");
            }
            if join_bounded(join, JOIN_TIMEOUT).is_none() {
                warn!(pending = handle.pending(), "Writer did not stop in time");
            }
        }
        info!("All feeds stopped");
    }

    /// `(name, alive)` for every feed.
    pub fn liveness(&self) -> Vec<(String, bool)> {
        self.feeds
            .iter()
            .map(|feed| (feed.name().to_string(), feed.is_alive()))
            .collect()
    }

    /// Stops and relaunches the named feed, rebuilding its handler if the
    /// old one was lost.
    ///
    /// # Errors
    ///
    /// Returns [`TapeError::Feed`] for an unknown name, or the launch failure.
    pub fn restart(&mut self, name: &str) -> Result<()> {
        let feed = self
            .feeds
            .iter_mut()
            .find(|feed| feed.name() == name)
            .ok_or_else(|| TapeError::Feed(format!("no feed named {name:?}")))?;

        feed.stop();
        if !feed.has_handler() {
            let handler = self
                .recorder
                .feeds
                .iter()
                .find(|channel| channel.as_str() == name)
                .and_then(|&channel| build_handler(channel, &self.recorder))
                .ok_or_else(|| TapeError::Feed(format!("cannot rebuild feed {name:?}")))?;
            feed.set_handler(handler);
        }
        feed.launch()
    }

    /// Hands out the receiver of feed exit events. Only the first call
    /// returns it.
    pub fn take_exits(&mut self) -> Option<mpsc::UnboundedReceiver<FeedExit>> {
        self.exits_rx.take()
    }

    pub fn writer(&self) -> Option<&WriterHandle> {
        self.writer.as_ref().map(|(handle, _)| handle)
    }
}

impl Drop for FeedManager {
    fn drop(&mut self) {
        if self.writer.is_some() {
            self.stop_all();
        }
    }
}

/// When to relaunch a failed feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Consecutive failures tolerated per feed before giving up.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// Delay before the `attempt`-th consecutive restart (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1 << doublings)
            .min(self.max_backoff)
    }
}

/// Owns a [`FeedManager`] while it runs.
#[derive(Debug)]
pub struct Supervisor {
    manager: FeedManager,
    policy: RestartPolicy,
    failures: HashMap<String, u32>,
    started: HashMap<String, Instant>,
}

impl Supervisor {
    pub fn new(manager: FeedManager, policy: RestartPolicy) -> Self {
        Self {
            manager,
            policy,
            failures: HashMap::new(),
            started: HashMap::new(),
        }
    }

    /// Starts every feed and restarts failed ones until `shutdown`
    /// resolves, then stops everything and returns the manager.
    ///
    /// Clean exits are not restarted. A feed that ran longer than the
    /// maximum backoff has its failure count reset.
    ///
    /// # Errors
    ///
    /// - [`TapeError::Feed`] if the exit receiver was already taken or the
    ///   final shutdown task failed.
    /// - Any error from the initial [`FeedManager::start_all`].
    pub async fn run<F>(mut self, shutdown: F) -> Result<FeedManager>
    where
        F: Future<Output = ()>,
    {
        let mut exits = self
            .manager
            .take_exits()
            .ok_or_else(|| TapeError::Feed("exit events already taken".to_string()))?;

        self.manager.start_all()?;
        let now = Instant::now();
        for (name, _) in self.manager.liveness() {
            self.started.insert(name, now);
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                exit = exits.recv() => {
                    let Some(exit) = exit else { break };
                    let Some(delay) = self.on_exit(&exit) else { continue };
                    tokio::select! {
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                    self.relaunch(&exit.name);
                }
            }
        }

        info!("Supervisor shutting down");
        let mut manager = self.manager;
        tokio::task::spawn_blocking(move || {
            manager.stop_all();
            manager
        })
        .await
        .map_err(|e| TapeError::Feed(format!("shutdown task failed: {e}")))
    }

    /// Returns the backoff before relaunching, or `None` if the feed stays
    /// down.
    fn on_exit(&mut self, exit: &FeedExit) -> Option<Duration> {
        let Some(reason) = &exit.error else {
            info!(feed = %exit.name, "Feed exited cleanly");
            self.failures.remove(&exit.name);
            return None;
        };

        let ran_for = self
            .started
            .get(&exit.name)
            .map_or(Duration::ZERO, Instant::elapsed);
        if ran_for >= self.policy.max_backoff {
            self.failures.remove(&exit.name);
        }

        let failures = self.failures.entry(exit.name.clone()).or_insert(0);
        *failures += 1;
        if *failures > self.policy.max_retries {
            error!(
                feed = %exit.name,
                failures = *failures,
                error = %reason,
                "Feed failed too often, giving up"
            );
            return None;
        }

        let delay = self.policy.backoff(*failures);
        warn!(
            feed = %exit.name,
            attempt = *failures,
            backoff_secs = delay.as_secs(),
            error = %reason,
            "Feed failed, restarting"
        );
        Some(delay)
    }

    fn relaunch(&mut self, name: &str) {
        match self.manager.restart(name) {
            Ok(()) => {
                self.started.insert(name.to_string(), Instant::now());
            }
            Err(e) => error!(feed = name, error = %e, "Restart failed"),
        }
    }
}
