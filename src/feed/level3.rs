//! `level3` channel: individual order events recorded as ticks.

use super::{ChannelHandler, Directive, received_at, submit};
use crate::Result;
use crate::accumulate::{BatchBuffer, FlushTrigger};
use crate::config::Level3Config;
use crate::decoder::Inbound;
use crate::models::{Channel, Params};
use crate::writer::{TickRow, WriterHandle, WriterPayload};

/// Buffers add/modify/delete events and flushes once more than
/// `log_ticks_every` are held. Snapshot orders carry no event and are not
/// recorded.
#[derive(Debug)]
pub struct Level3Handler {
    symbols: Vec<String>,
    config: Level3Config,
    buffer: BatchBuffer<TickRow>,
}

impl Level3Handler {
    pub fn new(symbols: Vec<String>, config: Level3Config) -> Self {
        Self {
            symbols,
            buffer: BatchBuffer::new(FlushTrigger::Exceeded(config.log_ticks_every)),
            config,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn params(&self, symbols: &[String], token: Option<&str>) -> Params {
        let params = Params::new(Channel::Orders, symbols);
        match token {
            Some(token) => params.with_token(token),
            None => params,
        }
    }

    fn flush(&self, writer: &WriterHandle, ticks: Vec<TickRow>) {
        submit(
            writer,
            WriterPayload::Level3 {
                ticks,
                out_file_name: self.config.out_file_name.clone(),
            },
        );
    }
}

impl ChannelHandler for Level3Handler {
    fn channel(&self) -> Channel {
        Channel::Orders
    }

    fn subscriptions(&self, token: Option<&str>) -> Vec<Params> {
        vec![self.params(&self.symbols, token)]
    }

    fn resubscription(&self, symbol: &str, token: Option<&str>) -> Params {
        self.params(&[symbol.to_string()], token)
    }

    fn handle(&mut self, inbound: Inbound, writer: &WriterHandle) -> Result<Directive> {
        let Inbound::Level3(response) = inbound else {
            return Ok(Directive::Continue);
        };

        let received = received_at();
        for data in response.data {
            let symbol = data.symbol;
            let ticks = data
                .bids
                .into_iter()
                .filter_map(|entry| TickRow::from_entry("b", entry, &symbol, &received))
                .chain(
                    data.asks
                        .into_iter()
                        .filter_map(|entry| TickRow::from_entry("a", entry, &symbol, &received)),
                )
                .collect::<Vec<_>>();
            for batch in self.buffer.extend(ticks) {
                self.flush(writer, batch);
            }
        }
        Ok(Directive::Continue)
    }

    fn on_shutdown(&mut self, writer: &WriterHandle) {
        if let Some(rest) = self.buffer.drain() {
            self.flush(writer, rest);
        }
    }
}
