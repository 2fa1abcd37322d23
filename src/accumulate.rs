//! Threshold-flushed row buffers.
//!
//! Trades, level-3 ticks, and similar streams are appended to a
//! [`BatchBuffer`] and handed to the writer in one payload once the
//! buffer's [`FlushTrigger`] fires. No reordering or deduplication happens
//! here.

/// When a [`BatchBuffer`] hands its rows over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Flush once the buffer holds at least `n` rows.
    Reached(usize),
    /// Flush once the buffer holds more than `n` rows.
    Exceeded(usize),
}

impl FlushTrigger {
    fn fires(&self, len: usize) -> bool {
        match *self {
            FlushTrigger::Reached(n) => len >= n,
            FlushTrigger::Exceeded(n) => len > n,
        }
    }
}

/// An append-only buffer drained when its trigger fires.
#[derive(Debug, Clone)]
pub struct BatchBuffer<T> {
    rows: Vec<T>,
    trigger: FlushTrigger,
}

impl<T> BatchBuffer<T> {
    pub fn new(trigger: FlushTrigger) -> Self {
        Self {
            rows: Vec::new(),
            trigger,
        }
    }

    /// Appends `row`, returning the full batch if this push fired the
    /// trigger. The buffer is empty afterwards.
    pub fn push(&mut self, row: T) -> Option<Vec<T>> {
        self.rows.push(row);
        if self.trigger.fires(self.rows.len()) {
            Some(std::mem::take(&mut self.rows))
        } else {
            None
        }
    }

    /// Appends every row, returning each batch that fired along the way.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, rows: I) -> Vec<Vec<T>> {
        rows.into_iter().filter_map(|row| self.push(row)).collect()
    }

    /// Takes whatever is buffered, e.g. on shutdown.
    pub fn drain(&mut self) -> Option<Vec<T>> {
        if self.rows.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.rows))
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
