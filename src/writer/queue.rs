//! The single ordered queue between producers and the writer thread.
//!
//! FIFO across all producers, safe for any number of producer threads and
//! one consumer. An optional capacity bound is enforced according to an
//! [`OverflowPolicy`]; the shutdown sentinel always bypasses the bound.

use std::collections::VecDeque;
use std::str::FromStr;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use super::payload::WriterPayload;
use crate::error::WriterError;

/// Behaviour of a bounded queue when a producer finds it full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait until the writer makes room.
    #[default]
    Block,
    /// Evict the oldest queued payload.
    DropOldest,
    /// Reject the new payload with [`WriterError::QueueFull`].
    Fail,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop-oldest" | "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            "fail" => Ok(OverflowPolicy::Fail),
            other => Err(format!(
                "unknown overflow policy {other:?}, expected block, drop-oldest or fail"
            )),
        }
    }
}

/// An entry on the queue.
#[derive(Debug)]
pub(crate) enum Message {
    Payload(WriterPayload),
    Shutdown,
}

#[derive(Debug, Default)]
struct State {
    items: VecDeque<Message>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
pub(crate) struct PayloadQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
    policy: OverflowPolicy,
}

impl PayloadQueue {
    pub(crate) fn new(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(State::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.map(|capacity| capacity.max(1)),
            policy,
        }
    }

    pub(crate) fn push(&self, payload: WriterPayload) -> Result<(), WriterError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(WriterError::Closed);
        }

        if let Some(capacity) = self.capacity {
            while state.items.len() >= capacity {
                match self.policy {
                    OverflowPolicy::Block => {
                        self.not_full.wait(&mut state);
                        if state.closed {
                            return Err(WriterError::Closed);
                        }
                    }
                    OverflowPolicy::DropOldest => {
                        if let Some(Message::Payload(evicted)) = state.items.pop_front() {
                            state.dropped += 1;
                            warn!(
                                channel = evicted.channel().as_str(),
                                dropped = state.dropped,
                                "Writer queue full, dropped oldest payload"
                            );
                        }
                    }
                    OverflowPolicy::Fail => {
                        return Err(WriterError::QueueFull { capacity });
                    }
                }
            }
        }

        state.items.push_back(Message::Payload(payload));
        self.not_empty.notify_one();
        Ok(())
    }

    /// Closes the queue and appends the sentinel. Idempotent.
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.items.push_back(Message::Shutdown);
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Waits up to `timeout` for the next entry.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.items.is_empty() {
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        let message = state.items.pop_front();
        if message.is_some() {
            self.not_full.notify_one();
        }
        message
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
