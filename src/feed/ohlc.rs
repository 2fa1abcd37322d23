//! `ohlc` channel: the live bar on every update, closed bars in bulk on
//! snapshot.

use super::{ChannelHandler, Directive, submit};
use crate::Result;
use crate::config::OhlcConfig;
use crate::decoder::Inbound;
use crate::models::{Channel, MessageKind, Params};
use crate::writer::{CandleMode, CandleRow, WriterHandle, WriterPayload};

#[derive(Debug)]
pub struct OhlcHandler {
    symbols: Vec<String>,
    config: OhlcConfig,
}

impl OhlcHandler {
    pub fn new(symbols: Vec<String>, config: OhlcConfig) -> Self {
        Self { symbols, config }
    }
}

impl ChannelHandler for OhlcHandler {
    fn channel(&self) -> Channel {
        Channel::Candles
    }

    fn subscriptions(&self, _token: Option<&str>) -> Vec<Params> {
        vec![Params::new(Channel::Candles, &self.symbols).with_interval(self.config.interval)]
    }

    fn resubscription(&self, symbol: &str, _token: Option<&str>) -> Params {
        Params::new(Channel::Candles, &[symbol.to_string()]).with_interval(self.config.interval)
    }

    fn handle(&mut self, inbound: Inbound, writer: &WriterHandle) -> Result<Directive> {
        let Inbound::Candle(response) = inbound else {
            return Ok(Directive::Continue);
        };

        let sent = response.timestamp;
        let rows: Vec<CandleRow> = response
            .data
            .into_iter()
            .map(|data| CandleRow::from_data(data, &sent))
            .collect();
        if rows.is_empty() {
            return Ok(Directive::Continue);
        }

        match response.tpe {
            MessageKind::Snapshot => {
                submit(writer, WriterPayload::Candles { mode: CandleMode::Snapshot, rows });
            }
            // One live bar per payload, so every symbol in the frame is kept.
            MessageKind::Update => {
                for row in rows {
                    submit(writer, WriterPayload::Candles { mode: CandleMode::Update, rows: vec![row] });
                }
            }
        }
        Ok(Directive::Continue)
    }
}
