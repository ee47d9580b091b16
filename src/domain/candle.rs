//! Closed 1-minute candle and the ingestion watermark.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A closed 1-minute bar, keyed by `(symbol, interval, open_time)`.
///
/// Fields are immutable once written for a given key; re-delivery of the
/// same bar is an idempotent upsert, never a mutation of OHLC values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub interval: String,
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trades: i64,
}

/// Watermark of the ingestion pipeline for a single `{symbol}_{interval}` stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOffset {
    pub stream_key: String,
    pub last_closed_open_time: i64,
    pub last_sync_at: i64,
}
