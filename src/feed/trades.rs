//! `trade` channel: executed trades flushed in batches.

use super::{ChannelHandler, Directive, submit};
use crate::Result;
use crate::accumulate::{BatchBuffer, FlushTrigger};
use crate::config::TradesConfig;
use crate::decoder::Inbound;
use crate::models::{Channel, Params};
use crate::writer::{TradeRow, WriterHandle, WriterPayload};

/// Buffers trades and hands them over once `log_trades_every` are held.
/// Snapshot trades are buffered like live ones.
#[derive(Debug)]
pub struct TradesHandler {
    symbols: Vec<String>,
    config: TradesConfig,
    buffer: BatchBuffer<TradeRow>,
}

impl TradesHandler {
    pub fn new(symbols: Vec<String>, config: TradesConfig) -> Self {
        Self {
            symbols,
            buffer: BatchBuffer::new(FlushTrigger::Reached(config.log_trades_every)),
            config,
        }
    }

    /// Trades waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl ChannelHandler for TradesHandler {
    fn channel(&self) -> Channel {
        Channel::Trades
    }

    fn subscriptions(&self, _token: Option<&str>) -> Vec<Params> {
        vec![Params::new(Channel::Trades, &self.symbols).with_snapshot(self.config.snapshot)]
    }

    fn handle(&mut self, inbound: Inbound, writer: &WriterHandle) -> Result<Directive> {
        let Inbound::Trade(response) = inbound else {
            return Ok(Directive::Continue);
        };

        for batch in self.buffer.extend(response.data.into_iter().map(TradeRow::from)) {
            submit(writer, WriterPayload::Trades(batch));
        }
        Ok(Directive::Continue)
    }

    fn on_shutdown(&mut self, writer: &WriterHandle) {
        if let Some(rest) = self.buffer.drain() {
            submit(writer, WriterPayload::Trades(rest));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{frame, writer};

    fn trades_frame(ids: std::ops::Range<u64>) -> Inbound {
        let data: Vec<String> = ids
            .map(|id| {
                format!(
                    r#"{{"symbol":"BTC/USD","side":"buy","price":65000.1,"qty":0.01,"ord_type":"market","trade_id":{id},"timestamp":"2024-10-11T01:20:09.952961Z"}}"#
                )
            })
            .collect();
        frame(&format!(
            r#"{{"channel":"trade","type":"update","data":[{}]}}"#,
            data.join(",")
        ))
    }

    fn handler(log_trades_every: usize) -> TradesHandler {
        TradesHandler::new(
            vec!["BTC/USD".to_string()],
            TradesConfig {
                log_trades_every,
                snapshot: true,
            },
        )
    }

    #[test]
    fn one_short_of_threshold_keeps_buffering() {
        let writer = writer();
        let mut handler = handler(3);
        handler.handle(trades_frame(0..2), &writer).unwrap();
        assert_eq!(handler.buffered(), 2);
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn reaching_threshold_flushes_and_clears() {
        let writer = writer();
        let mut handler = handler(3);
        handler.handle(trades_frame(0..3), &writer).unwrap();
        assert_eq!(handler.buffered(), 0);

        let Some(WriterPayload::Trades(rows)) = writer.next_payload() else {
            panic!("expected trades");
        };
        let ids: Vec<u64> = rows.iter().map(|row| row.trade_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn shutdown_flushes_partial_batch() {
        let writer = writer();
        let mut handler = handler(100);
        handler.handle(trades_frame(0..4), &writer).unwrap();
        handler.on_shutdown(&writer);
        assert!(matches!(
            writer.next_payload(),
            Some(WriterPayload::Trades(rows)) if rows.len() == 4
        ));
    }

    #[test]
    fn subscribe_requests_snapshot() {
        let params = handler(1).subscriptions(None).remove(0);
        assert_eq!(params.snapshot, Some(true));
        assert_eq!(params.channel, "trade");
    }
}
