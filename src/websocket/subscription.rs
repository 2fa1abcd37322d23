//! Channel subscription and unsubscription operations.

use tracing::{debug, info};

use super::{WsWriter, send_json};
use crate::Result;
use crate::models::{Params, SubscribeRequest, UnsubscribeRequest};

/// Sends a `subscribe` request built from `params`.
///
/// # Errors
///
/// Returns a [`TapeError`](crate::TapeError) if sending the subscription message fails.
pub async fn subscribe(write: &mut WsWriter, params: Params) -> Result<()> {
    let channel = params.channel.clone();
    let symbols = params.symbol.clone();
    let request = SubscribeRequest::new(params);
    debug!(channel, "Sending subscribe request");
    send_json(write, &request).await?;
    info!(channel, ?symbols, "Subscribed to channel");

    Ok(())
}

/// Sends an `unsubscribe` request built from `params`.
///
/// # Errors
///
/// Returns a [`TapeError`](crate::TapeError) if sending the unsubscribe message fails.
pub async fn unsubscribe(write: &mut WsWriter, params: Params) -> Result<()> {
    let channel = params.channel.clone();
    let symbols = params.symbol.clone();
    send_json(write, &UnsubscribeRequest::new(params)).await?;
    info!(channel, ?symbols, "Unsubscribed from channel");

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::models::book::BookDepth;
    use crate::models::{Channel, Params, SubscribeRequest, UnsubscribeRequest};

    #[test]
    fn book_subscribe_wire_format() {
        let params = Params::new(Channel::Book, &["BTC/USD".to_string()]).with_depth(BookDepth::D25);
        let json = serde_json::to_value(SubscribeRequest::new(params)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "method": "subscribe",
                "params": { "channel": "book", "symbol": ["BTC/USD"], "depth": 25 }
            })
        );
    }

    #[test]
    fn instrument_request_omits_symbols() {
        let params = Params::new(Channel::Instruments, &[]);
        let json = serde_json::to_value(UnsubscribeRequest::new(params)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "method": "unsubscribe", "params": { "channel": "instrument" } })
        );
    }

    #[test]
    fn level3_request_carries_token() {
        let params = Params::new(Channel::Orders, &["ETH/USD".to_string()]).with_token("tok");
        let json = serde_json::to_value(SubscribeRequest::new(params)).unwrap();
        assert_eq!(json["params"]["channel"], "level3");
        assert_eq!(json["params"]["token"], "tok");
        assert!(json["params"].get("depth").is_none());
    }
}
