//! Decoding of recorded Kraken WebSocket V2 frames into typed rows.

use rust_decimal_macros::dec;

use kraken_tape::decoder::{Inbound, decode};
use kraken_tape::models::MessageKind;
use kraken_tape::models::orders::OrderEvent;
use kraken_tape::writer::{CandleRow, Record, TickRow, TickerRow, TradeRow};

const TICKER_JSON: &str = include_str!("fixtures/ticker.json");
const TRADE_JSON: &str = include_str!("fixtures/trade.json");
const CANDLE_JSON: &str = include_str!("fixtures/candle.json");
const ORDERS_JSON: &str = include_str!("fixtures/orders.json");
const INSTRUMENT_JSON: &str = include_str!("fixtures/instrument.json");
const BOOK_SNAPSHOT_JSON: &str = include_str!("fixtures/book_snapshot.json");

#[test]
fn test_ticker_frame_decodes_and_falls_back_to_receive_time() {
    let Inbound::Ticker(response) = decode(TICKER_JSON).unwrap() else {
        panic!("expected ticker frame");
    };
    assert_eq!(response.tpe, MessageKind::Update);

    let data = response.data.into_iter().next().unwrap();
    assert_eq!(data.bid, dec!(42150.5));
    assert_eq!(data.change_pct, dec!(0.84));
    assert!(data.timestamp.is_none());

    let row = TickerRow::from_data(data, "2024-10-11T01:20:13.000000Z");
    assert_eq!(row.timestamp, "2024-10-11T01:20:13.000000Z");
    let fields = row.fields();
    assert_eq!(fields.len(), 13);
    assert_eq!(fields[1], "BTC/USD");
}

#[test]
fn test_trade_frame_keeps_exchange_precision() {
    let Inbound::Trade(response) = decode(TRADE_JSON).unwrap() else {
        panic!("expected trade frame");
    };
    assert_eq!(response.data.len(), 2);

    let rows: Vec<TradeRow> = response.data.into_iter().map(TradeRow::from).collect();
    assert_eq!(rows[0].qty, dec!(0.0015));
    assert_eq!(rows[0].price, dec!(42152.1));
    assert_eq!(rows[1].side, "sell");
    assert_eq!(
        rows[1].fields(),
        vec![
            "2024-10-11T01:20:11.398410Z",
            "BTC/USD",
            "42151.9",
            "0.25",
            "sell",
            "limit",
            "74352147",
        ]
    );
}

#[test]
fn test_candle_frame_uses_envelope_timestamp_as_ttrue() {
    let Inbound::Candle(response) = decode(CANDLE_JSON).unwrap() else {
        panic!("expected ohlc frame");
    };
    let sent = response.timestamp.clone();
    let data = response.data.into_iter().next().unwrap();
    assert_eq!(data.interval, 5);
    assert_eq!(data.trades, 318);

    let row = CandleRow::from_data(data, &sent);
    assert_eq!(row.tstart, "2024-10-11T01:15:00.000000000Z");
    assert_eq!(row.ttrue, "2024-10-11T01:20:12.011384Z");
    assert_eq!(row.fields().len(), 11);
}

#[test]
fn test_level3_frame_maps_events_to_actions() {
    let Inbound::Level3(response) = decode(ORDERS_JSON).unwrap() else {
        panic!("expected level3 frame");
    };
    let data = response.data.into_iter().next().unwrap();
    assert_eq!(data.bids[0].event, Some(OrderEvent::Add));
    assert_eq!(data.asks[0].event, Some(OrderEvent::Delete));

    let received = "2024-10-11T01:20:11.600000Z";
    let bid = TickRow::from_entry("b", data.bids[0].clone(), &data.symbol, received).unwrap();
    let ask = TickRow::from_entry("a", data.asks[0].clone(), &data.symbol, received).unwrap();
    assert_eq!(bid.action, "A");
    assert_eq!(ask.action, "C");
    assert_eq!(ask.order_id, "O5YNBQ-LUBCX-GOLZCS");
    assert_eq!(bid.ts_recv, received);
}

#[test]
fn test_instrument_snapshot_renders_missing_values_as_none() {
    let Inbound::Instrument(response) = decode(INSTRUMENT_JSON).unwrap() else {
        panic!("expected instrument frame");
    };
    assert_eq!(response.tpe, MessageKind::Snapshot);
    assert_eq!(response.data.pairs.len(), 1);
    assert_eq!(response.data.assets.len(), 2);

    let pair = &response.data.pairs[0];
    assert_eq!(pair.qty_increment, dec!(0.00000001));
    assert_eq!(pair.position_limit_long, Some(250));
    assert_eq!(pair.fields().len(), 17);

    let usd = response.data.assets[1].fields();
    assert_eq!(usd[0], "USD");
    assert_eq!(usd[6], "None");
}

#[test]
fn test_book_snapshot_decodes_checksum_and_levels() {
    let Inbound::Book(response) = decode(BOOK_SNAPSHOT_JSON).unwrap() else {
        panic!("expected book frame");
    };
    assert_eq!(response.tpe, MessageKind::Snapshot);
    let data = &response.data[0];
    assert_eq!(data.checksum, 4293188607);
    assert_eq!(data.bids.len(), 10);
    assert_eq!(data.asks[0].price, dec!(101.0));
    assert_eq!(data.bids[5].qty, dec!(1.5));
}

#[test]
fn test_malformed_frames_are_rejected() {
    assert!(decode("not json").is_err());
    assert!(decode(r#"{"data":[]}"#).is_err());
    assert!(decode(r#"{"channel":"trade","type":"update","data":[{"symbol":"BTC/USD"}]}"#).is_err());
}

#[test]
fn test_unknown_channel_is_passed_through() {
    let inbound = decode(r#"{"channel":"executions","type":"update","data":[]}"#).unwrap();
    assert!(matches!(inbound, Inbound::Unknown { channel } if channel == "executions"));
}
