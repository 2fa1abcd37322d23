//! `instrument` channel: reference data dumped once, then the feed closes.

use tracing::info;

use super::{ChannelHandler, Directive, submit};
use crate::Result;
use crate::decoder::Inbound;
use crate::models::{Channel, MessageKind, Params};
use crate::writer::{WriterHandle, WriterPayload};

#[derive(Debug, Default)]
pub struct InstrumentsHandler;

impl InstrumentsHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ChannelHandler for InstrumentsHandler {
    fn channel(&self) -> Channel {
        Channel::Instruments
    }

    fn subscriptions(&self, _token: Option<&str>) -> Vec<Params> {
        vec![Params::new(Channel::Instruments, &[]).with_snapshot(true)]
    }

    fn resubscription(&self, _symbol: &str, _token: Option<&str>) -> Params {
        Params::new(Channel::Instruments, &[]).with_snapshot(true)
    }

    fn handle(&mut self, inbound: Inbound, writer: &WriterHandle) -> Result<Directive> {
        let Inbound::Instrument(response) = inbound else {
            return Ok(Directive::Continue);
        };
        if response.tpe != MessageKind::Snapshot {
            return Ok(Directive::Continue);
        }

        let data = response.data;
        info!(
            pairs = data.pairs.len(),
            assets = data.assets.len(),
            "Received instrument snapshot"
        );
        submit(
            writer,
            WriterPayload::Instruments {
                pairs: data.pairs,
                assets: data.assets,
            },
        );
        Ok(Directive::Close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{frame, writer};

    #[test]
    fn snapshot_is_dumped_and_feed_closes() {
        let writer = writer();
        let mut handler = InstrumentsHandler::new();
        let text = r#"{"channel":"instrument","type":"snapshot","data":{"assets":[{"id":"BTC","status":"enabled","precision":10,"precision_display":5,"borrowable":true,"collateral_value":1.0,"margin_rate":0.01}],"pairs":[{"symbol":"BTC/USD","base":"BTC","quote":"USD","status":"online","qty_precision":8,"qty_increment":0.00000001,"price_precision":1,"cost_precision":5,"marginable":true,"has_index":true,"cost_min":0.5,"margin_initial":0.2,"position_limit_long":250,"position_limit_short":200,"tick_size":0.1,"price_increment":0.1,"qty_min":0.0001}]}}"#;

        assert_eq!(handler.handle(frame(text), &writer).unwrap(), Directive::Close);
        let Some(WriterPayload::Instruments { pairs, assets }) = writer.next_payload() else {
            panic!("expected instruments");
        };
        assert_eq!(pairs[0].symbol, "BTC/USD");
        assert_eq!(assets[0].id, "BTC");
    }

    #[test]
    fn updates_are_ignored() {
        let writer = writer();
        let mut handler = InstrumentsHandler::new();
        let text = r#"{"channel":"instrument","type":"update","data":{"assets":[],"pairs":[]}}"#;
        assert_eq!(handler.handle(frame(text), &writer).unwrap(), Directive::Continue);
        assert_eq!(writer.pending(), 0);
    }
}
