//! Repository Pattern Abstractions
//!
//! Separates the domain and use-case layers from the sqlx-backed storage
//! that implements these traits in `infrastructure::persistence`.

use crate::domain::candle::{Candle, StreamOffset};
use crate::domain::episode::Episode;
use crate::domain::indicators::{IndicatorSet, IndicatorSnapshot};
use crate::domain::signal::Signal;
use crate::domain::strategy::Strategy;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CandleRepository: Send + Sync {
    /// Idempotent upsert keyed by `(symbol, interval, open_time)`.
    async fn upsert_many(&self, candles: &[Candle]) -> Result<()>;

    /// The most recent `limit` candles for `(symbol, interval)`, ascending by close_time.
    async fn latest(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;
}

#[async_trait]
pub trait StreamOffsetRepository: Send + Sync {
    async fn get(&self, stream_key: &str) -> Result<Option<StreamOffset>>;

    async fn upsert(&self, offset: &StreamOffset) -> Result<()>;
}

#[async_trait]
pub trait IndicatorSetRepository: Send + Sync {
    /// Get-or-create by the unique `(symbol, ema_fast, ema_slow, atr_window)` key.
    async fn upsert(&self, set: &IndicatorSet) -> Result<IndicatorSet>;

    async fn active_for_symbol(&self, symbol: &str) -> Result<Vec<IndicatorSet>>;
}

#[async_trait]
pub trait IndicatorRepository: Send + Sync {
    /// Idempotent upsert keyed by `(symbol, close_time, cfg_hash)`.
    async fn upsert(&self, snapshot: &IndicatorSnapshot) -> Result<()>;

    async fn latest(&self, symbol: &str, cfg_hash: &str) -> Result<Option<IndicatorSnapshot>>;
}

#[async_trait]
pub trait StrategyRepository: Send + Sync {
    async fn active(&self) -> Result<Vec<Strategy>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Strategy>>;
}

#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    async fn open_for_strategy(&self, strategy_id: &str) -> Result<Option<Episode>>;

    /// Insert a newly-opened episode, or update the streak fields of the
    /// currently open one in place.
    async fn upsert_open(&self, strategy_id: &str, episode: &Episode) -> Result<()>;

    /// Close the strategy's currently open episode.
    async fn close(
        &self,
        strategy_id: &str,
        close_time: i64,
        close_price: f64,
        close_reason: &crate::domain::types::CloseReason,
    ) -> Result<()>;
}

#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Upsert keyed by `(strategy_id, ts, signal_type)`; re-emission of the
    /// same plan replaces steps and resets attempts rather than duplicating.
    async fn upsert(&self, strategy_id: &str, signal: &Signal) -> Result<()>;

    async fn list_pending(&self, limit: usize) -> Result<Vec<(String, Signal)>>;

    async fn mark_executed(&self, strategy_id: &str, ts: i64, signal_type: crate::domain::signal::SignalType) -> Result<()>;

    async fn mark_failure(
        &self,
        strategy_id: &str,
        ts: i64,
        signal_type: crate::domain::signal::SignalType,
        error: &str,
    ) -> Result<()>;
}
