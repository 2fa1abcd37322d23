//! `book` channel: L2 reconstruction and periodic book lines.

use std::collections::BTreeSet;

use tracing::debug;

use super::{ChannelHandler, Directive, submit};
use crate::Result;
use crate::book::{BookManager, SymbolId, SyncState};
use crate::config::BookConfig;
use crate::decoder::Inbound;
use crate::error::BookError;
use crate::models::book::BookData;
use crate::models::{Channel, MessageKind, Params};
use crate::writer::{WriterHandle, WriterPayload};

/// Maintains one [`BookManager`] and emits a book line for every symbol
/// that changed, once every `log_book_every` applied messages.
#[derive(Debug)]
pub struct BookHandler {
    symbols: Vec<String>,
    config: BookConfig,
    books: BookManager,
    changed: BTreeSet<SymbolId>,
    applied: usize,
}

impl BookHandler {
    pub fn new(symbols: Vec<String>, config: BookConfig) -> Self {
        Self {
            symbols,
            books: BookManager::new(config.depth, config.checksum_policy),
            config,
            changed: BTreeSet::new(),
            applied: 0,
        }
    }

    pub fn books(&self) -> &BookManager {
        &self.books
    }

    fn apply(&mut self, kind: MessageKind, data: &BookData) -> std::result::Result<(), BookError> {
        match kind {
            MessageKind::Snapshot => {
                self.books
                    .apply_snapshot(&data.symbol, &data.bids, &data.asks, data.checksum)
            }
            MessageKind::Update => {
                self.books.apply_update(&data.symbol, &data.bids, &data.asks)?;
                if data.checksum != 0 {
                    self.books.check_checksum(&data.symbol, data.checksum)?;
                }
                Ok(())
            }
        }
    }

    fn emit(&mut self, writer: &WriterHandle) {
        let depth = self.books.depth();
        for id in std::mem::take(&mut self.changed) {
            let symbol = self.books.symbols().name(id);
            match self.books.snapshot_for_output(symbol) {
                Ok(line) => submit(writer, WriterPayload::Book { line, depth }),
                Err(e) => debug!(symbol, error = %e, "Skipping book line"),
            }
        }
        self.applied = 0;
    }
}

impl ChannelHandler for BookHandler {
    fn channel(&self) -> Channel {
        Channel::Book
    }

    fn subscriptions(&self, _token: Option<&str>) -> Vec<Params> {
        vec![Params::new(Channel::Book, &self.symbols).with_depth(self.config.depth)]
    }

    fn resubscription(&self, symbol: &str, _token: Option<&str>) -> Params {
        Params::new(Channel::Book, &[symbol.to_string()]).with_depth(self.config.depth)
    }

    fn handle(&mut self, inbound: Inbound, writer: &WriterHandle) -> Result<Directive> {
        let Inbound::Book(response) = inbound else {
            return Ok(Directive::Continue);
        };

        let mut desynced: Vec<String> = Vec::new();
        let mut touched = false;
        for data in &response.data {
            if let Err(e) = self.apply(response.tpe, data) {
                if let BookError::NotSynced { .. } = e {
                    debug!(symbol = %data.symbol, "Ignoring update for unsynced book");
                    continue;
                }
                if self.books.state(&data.symbol) == SyncState::Desynced {
                    if !desynced.contains(&data.symbol) {
                        desynced.push(data.symbol.clone());
                    }
                    continue;
                }
            }

            self.books.stamp(&data.symbol, &data.timestamp);
            let id = self.books.intern(&data.symbol);
            self.changed.insert(id);
            touched = true;
        }

        // Throttle counts frames, not symbols within a frame.
        if touched {
            self.applied += 1;
        }
        if self.applied >= self.config.log_book_every {
            self.emit(writer);
        }
        if desynced.is_empty() {
            Ok(Directive::Continue)
        } else {
            Ok(Directive::Resubscribe(desynced))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::ChecksumPolicy;
    use crate::feed::testing::{frame, writer};
    use crate::models::book::BookDepth;

    const SNAPSHOT: &str = include_str!("../../tests/fixtures/book_snapshot.json");
    const UPDATE: &str = include_str!("../../tests/fixtures/book_update.json");

    fn handler(log_book_every: usize) -> BookHandler {
        BookHandler::new(
            vec!["BTC/USD".to_string()],
            BookConfig {
                depth: BookDepth::D10,
                log_book_every,
                checksum_policy: ChecksumPolicy::Flag,
            },
        )
    }

    #[test]
    fn snapshot_then_update_emits_lines() {
        let writer = writer();
        let mut handler = handler(1);

        assert_eq!(handler.handle(frame(SNAPSHOT), &writer).unwrap(), Directive::Continue);
        assert_eq!(handler.handle(frame(UPDATE), &writer).unwrap(), Directive::Continue);
        assert_eq!(handler.books().checksum_mismatches(), 0);

        let Some(WriterPayload::Book { line, depth }) = writer.next_payload() else {
            panic!("expected a book line");
        };
        assert_eq!(depth, BookDepth::D10);
        assert_eq!(line.timestamp, "2024-10-11T01:20:09.952961Z");
        assert_eq!(line.levels[2], "100.500000000");

        let Some(WriterPayload::Book { line, .. }) = writer.next_payload() else {
            panic!("expected a second book line");
        };
        assert_eq!(line.timestamp, "2024-10-11T01:20:10.114302Z");
        assert_eq!(line.levels[2], "100.000000000");
    }

    #[test]
    fn lines_are_throttled() {
        let writer = writer();
        let mut handler = handler(2);
        handler.handle(frame(SNAPSHOT), &writer).unwrap();
        assert_eq!(writer.pending(), 0);
        handler.handle(frame(UPDATE), &writer).unwrap();
        assert_eq!(writer.pending(), 1);
    }

    #[test]
    fn update_before_snapshot_is_ignored() {
        let writer = writer();
        let mut handler = handler(1);
        assert_eq!(handler.handle(frame(UPDATE), &writer).unwrap(), Directive::Continue);
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn invariant_violation_requests_resubscribe() {
        let writer = writer();
        let mut handler = handler(1);
        handler.handle(frame(SNAPSHOT), &writer).unwrap();

        let orphan = r#"{"channel":"book","type":"update","data":[{"symbol":"BTC/USD","bids":[{"price":42.0,"qty":0}],"asks":[],"checksum":0,"timestamp":"t"}]}"#;
        assert_eq!(
            handler.handle(frame(orphan), &writer).unwrap(),
            Directive::Resubscribe(vec!["BTC/USD".to_string()])
        );
        assert_eq!(handler.books().state("BTC/USD"), SyncState::Desynced);

        let params = handler.resubscription("BTC/USD", None);
        assert_eq!(params.symbol, vec!["BTC/USD".to_string()]);
        assert_eq!(params.depth, Some(10));
    }

    /// The fixture snapshot, carrying the same levels for each symbol.
    fn snapshot_for(symbols: &[&str]) -> String {
        let mut value: serde_json::Value = serde_json::from_str(SNAPSHOT).unwrap();
        let template = value["data"][0].clone();
        let data = symbols
            .iter()
            .map(|symbol| {
                let mut entry = template.clone();
                entry["symbol"] = serde_json::Value::from(*symbol);
                entry
            })
            .collect();
        value["data"] = serde_json::Value::Array(data);
        value.to_string()
    }

    #[test]
    fn every_desynced_symbol_is_resubscribed() {
        let writer = writer();
        let mut handler = BookHandler::new(
            vec!["BTC/USD".to_string(), "ETH/USD".to_string()],
            BookConfig {
                depth: BookDepth::D10,
                log_book_every: 1,
                checksum_policy: ChecksumPolicy::Flag,
            },
        );
        handler.handle(frame(&snapshot_for(&["BTC/USD", "ETH/USD"])), &writer).unwrap();
        assert_eq!(handler.books().state("ETH/USD"), SyncState::Synced);

        let orphan = r#"{"channel":"book","type":"update","data":[
            {"symbol":"BTC/USD","bids":[{"price":42.0,"qty":0}],"asks":[],"checksum":0,"timestamp":"t"},
            {"symbol":"ETH/USD","bids":[{"price":42.0,"qty":0}],"asks":[],"checksum":0,"timestamp":"t"},
            {"symbol":"BTC/USD","bids":[{"price":43.0,"qty":0}],"asks":[],"checksum":0,"timestamp":"t"}
        ]}"#;
        assert_eq!(
            handler.handle(frame(orphan), &writer).unwrap(),
            Directive::Resubscribe(vec!["BTC/USD".to_string(), "ETH/USD".to_string()])
        );
        assert_eq!(handler.books().state("BTC/USD"), SyncState::Desynced);
        assert_eq!(handler.books().state("ETH/USD"), SyncState::Desynced);
    }

    #[test]
    fn throttle_counts_frames() {
        let writer = writer();
        let mut handler = BookHandler::new(
            vec!["BTC/USD".to_string(), "ETH/USD".to_string()],
            BookConfig {
                depth: BookDepth::D10,
                log_book_every: 2,
                checksum_policy: ChecksumPolicy::Flag,
            },
        );
        handler.handle(frame(&snapshot_for(&["BTC/USD", "ETH/USD"])), &writer).unwrap();
        assert_eq!(writer.pending(), 0);

        handler.handle(frame(UPDATE), &writer).unwrap();
        assert_eq!(writer.pending(), 2);
    }

    #[test]
    fn flagged_update_checksum_keeps_recording() {
        let writer = writer();
        let mut handler = handler(1);
        handler.handle(frame(SNAPSHOT), &writer).unwrap();

        let wrong = UPDATE.replace("1805654929", "1");
        assert_eq!(handler.handle(frame(&wrong), &writer).unwrap(), Directive::Continue);
        assert_eq!(handler.books().checksum_mismatches(), 1);
        assert_eq!(writer.pending(), 2);
    }
}
