//! Kraken WebSocket V2 market-data recorder.
//!
//! Subscribes to Kraken's public and level-3 channels, rebuilds
//! checksum-verified L2 order books, accumulates ticks, trades and candles,
//! and persists everything through a single batched writer into CSV,
//! Parquet, or SQLite.

pub mod accumulate;
pub mod auth;
pub mod book;
pub mod config;
pub mod decoder;
pub mod error;
pub mod feed;
pub mod manager;
pub mod models;
pub mod websocket;
pub mod writer;

pub use error::{Result, TapeError};
