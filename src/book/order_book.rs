//! A single bounded-depth price-level book.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::checksum::book_checksum;
use crate::error::Side;
use crate::models::book::PriceLevel;

/// Lifecycle of one symbol's book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No snapshot received yet.
    #[default]
    Uninitialized,
    Synced,
    /// An invariant broke; only a fresh snapshot re-arms the book.
    Desynced,
}

/// Why a side rejected an update before anything was mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RemovalWithoutReplacement {
    pub price: Decimal,
}

/// Both sides of one symbol's book, keyed by price.
///
/// `BTreeMap` keeps each side sorted; bids are read in reverse so the best
/// bid comes first.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    state: SyncState,
    timestamp: String,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SyncState) {
        self.state = state;
    }

    /// Exchange timestamp of the last applied message.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: &str) {
        if !timestamp.is_empty() {
            self.timestamp = timestamp.to_string();
        }
    }

    /// Bids from best (highest) to worst.
    pub fn bids(&self) -> impl Iterator<Item = (&Decimal, &Decimal)> {
        self.bids.iter().rev()
    }

    /// Asks from best (lowest) to worst.
    pub fn asks(&self) -> impl Iterator<Item = (&Decimal, &Decimal)> {
        self.asks.iter()
    }

    pub fn bid_len(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_len(&self) -> usize {
        self.asks.len()
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .last_key_value()
            .map(|(price, qty)| PriceLevel::new(*price, *qty))
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .first_key_value()
            .map(|(price, qty)| PriceLevel::new(*price, *qty))
    }

    /// Replaces both sides wholesale.
    pub(crate) fn replace(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids = bids.iter().map(|l| (l.price, l.qty)).collect();
        self.asks = asks.iter().map(|l| (l.price, l.qty)).collect();
    }

    pub fn checksum(&self) -> u32 {
        book_checksum(self.asks(), self.bids())
    }

    /// Checks that removals either hit a resting level or arrive together
    /// with an upsert that introduces a new price.
    pub(crate) fn validate_deltas(
        &self,
        side: Side,
        deltas: &[PriceLevel],
    ) -> Result<(), RemovalWithoutReplacement> {
        let levels = self.side(side);
        let introduces_price = deltas
            .iter()
            .any(|d| !d.is_removal() && !levels.contains_key(&d.price));
        if introduces_price {
            return Ok(());
        }
        match deltas
            .iter()
            .find(|d| d.is_removal() && !levels.contains_key(&d.price))
        {
            Some(orphan) => Err(RemovalWithoutReplacement {
                price: orphan.price,
            }),
            None => Ok(()),
        }
    }

    /// Applies deltas in message order, then trims the side to `depth`.
    ///
    /// Returns the resulting side length.
    pub(crate) fn apply_deltas(&mut self, side: Side, deltas: &[PriceLevel], depth: usize) -> usize {
        let levels = self.side_mut(side);
        for delta in deltas {
            if delta.is_removal() {
                levels.remove(&delta.price);
            } else {
                levels.insert(delta.price, delta.qty);
            }
        }
        while levels.len() > depth {
            // Worst bid is the lowest price, worst ask the highest.
            match side {
                Side::Bid => levels.pop_first(),
                Side::Ask => levels.pop_last(),
            };
        }
        levels.len()
    }

    /// Returns the best bid if it meets or crosses the best ask.
    pub(crate) fn crossed_at(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if bid.price >= ask.price => Some(bid.price),
            _ => None,
        }
    }

    fn side(&self, side: Side) -> &BTreeMap<Decimal, Decimal> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, Decimal> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }
}
