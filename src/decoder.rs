//! Inbound frame classification.
//!
//! Every text frame is first read through a small envelope (`method`,
//! `channel`, `type`) and then decoded into the typed response for its
//! channel. Control traffic (pong, subscribe acknowledgements, heartbeat,
//! status) gets its own variants so handlers can treat it as a no-op.

use serde::Deserialize;

use crate::TapeError;
use crate::models::book::BookUpdateResponse;
use crate::models::candle::CandleUpdateResponse;
use crate::models::instrument::InstrumentUpdateResponse;
use crate::models::orders::OrdersUpdateResponse;
use crate::models::ticker::TickerUpdateResponse;
use crate::models::trade::TradeUpdateResponse;
use crate::models::{MethodResponse, PongResponse, StatusUpdateResponse};

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Inbound {
    Pong(PongResponse),
    /// Acknowledgement of a `subscribe`/`unsubscribe` request.
    Ack(MethodResponse),
    Heartbeat,
    Status(StatusUpdateResponse),
    Ticker(TickerUpdateResponse),
    Book(BookUpdateResponse),
    Trade(TradeUpdateResponse),
    Candle(CandleUpdateResponse),
    Level3(OrdersUpdateResponse),
    Instrument(InstrumentUpdateResponse),
    /// A channel this crate does not model.
    Unknown { channel: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

/// Decodes one text frame.
///
/// # Errors
///
/// Returns [`TapeError::MalformedMessage`] if the frame is not JSON, carries
/// neither `method` nor `channel`, or a data channel is missing a required
/// field.
pub fn decode(text: &str) -> crate::Result<Inbound> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| TapeError::MalformedMessage(format!("invalid frame: {e}")))?;

    if let Some(method) = envelope.method.as_deref() {
        return match method {
            "pong" => typed(text, "pong").map(Inbound::Pong),
            _ => typed(text, method).map(Inbound::Ack),
        };
    }

    let Some(channel) = envelope.channel else {
        return Err(TapeError::MalformedMessage(
            "frame has neither method nor channel".to_string(),
        ));
    };

    match channel.as_str() {
        "heartbeat" => Ok(Inbound::Heartbeat),
        "status" => typed(text, &channel).map(Inbound::Status),
        "ticker" => typed(text, &channel).map(Inbound::Ticker),
        "book" => typed(text, &channel).map(Inbound::Book),
        "trade" => typed(text, &channel).map(Inbound::Trade),
        "ohlc" => typed(text, &channel).map(Inbound::Candle),
        "level3" => typed(text, &channel).map(Inbound::Level3),
        "instrument" => typed(text, &channel).map(Inbound::Instrument),
        _ => Ok(Inbound::Unknown { channel }),
    }
}

fn typed<T: for<'de> Deserialize<'de>>(text: &str, label: &str) -> crate::Result<T> {
    serde_json::from_str(text)
        .map_err(|e| TapeError::MalformedMessage(format!("{label}: {e}")))
}
