//! `ticker` channel: one L1 row per observation.

use super::{ChannelHandler, Directive, received_at, submit};
use crate::Result;
use crate::decoder::Inbound;
use crate::models::{Channel, Params};
use crate::writer::{TickerRow, WriterHandle, WriterPayload};

#[derive(Debug)]
pub struct TickerHandler {
    symbols: Vec<String>,
}

impl TickerHandler {
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }
}

impl ChannelHandler for TickerHandler {
    fn channel(&self) -> Channel {
        Channel::Ticker
    }

    fn subscriptions(&self, _token: Option<&str>) -> Vec<Params> {
        vec![Params::new(Channel::Ticker, &self.symbols)]
    }

    fn handle(&mut self, inbound: Inbound, writer: &WriterHandle) -> Result<Directive> {
        let Inbound::Ticker(response) = inbound else {
            return Ok(Directive::Continue);
        };

        let received = received_at();
        let rows: Vec<TickerRow> = response
            .data
            .into_iter()
            .map(|data| TickerRow::from_data(data, &received))
            .collect();
        if !rows.is_empty() {
            submit(writer, WriterPayload::Ticker(rows));
        }
        Ok(Directive::Continue)
    }
}
