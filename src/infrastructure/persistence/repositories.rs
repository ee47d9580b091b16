use crate::domain::candle::{Candle, StreamOffset};
use crate::domain::episode::Episode;
use crate::domain::indicators::{IndicatorSet, IndicatorSnapshot};
use crate::domain::repositories::{
    CandleRepository, EpisodeRepository, IndicatorRepository, IndicatorSetRepository,
    SignalRepository, StrategyRepository, StreamOffsetRepository,
};
use crate::domain::signal::{Signal, SignalStatus, SignalType, Step};
use crate::domain::strategy::Strategy;
use crate::domain::types::{CloseReason, Dex, EpisodeStatus, IndicatorSetStatus, Majority, PoolType, StrategyStatus, Trend};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;

fn signal_type_str(t: SignalType) -> &'static str {
    match t {
        SignalType::OpenNewRange => "OPEN_NEW_RANGE",
        SignalType::RebalanceToRange => "REBALANCE_TO_RANGE",
        SignalType::FullMaintenance => "FULL_MAINTENANCE",
    }
}

fn signal_type_from_str(s: &str) -> SignalType {
    match s {
        "REBALANCE_TO_RANGE" => SignalType::RebalanceToRange,
        "FULL_MAINTENANCE" => SignalType::FullMaintenance,
        _ => SignalType::OpenNewRange,
    }
}

fn signal_status_str(s: SignalStatus) -> &'static str {
    match s {
        SignalStatus::Pending => "PENDING",
        SignalStatus::Executed => "EXECUTED",
        SignalStatus::Failed => "FAILED",
    }
}

fn signal_status_from_str(s: &str) -> SignalStatus {
    match s {
        "EXECUTED" => SignalStatus::Executed,
        "FAILED" => SignalStatus::Failed,
        _ => SignalStatus::Pending,
    }
}

pub struct SqliteCandleRepository {
    pool: SqlitePool,
}

impl SqliteCandleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandleRepository for SqliteCandleRepository {
    async fn upsert_many(&self, candles: &[Candle]) -> Result<()> {
        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candles_1m (symbol, interval, open_time, close_time, open, high, low, close, volume, trades)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, interval, open_time) DO NOTHING
                "#,
            )
            .bind(&candle.symbol)
            .bind(&candle.interval)
            .bind(candle.open_time)
            .bind(candle.close_time)
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .bind(candle.trades)
            .execute(&self.pool)
            .await
            .context("Failed to upsert candle")?;
        }
        Ok(())
    }

    async fn latest(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT * FROM candles_1m WHERE symbol = ? AND interval = ? ORDER BY close_time DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(interval)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(Candle {
                symbol: row.try_get("symbol")?,
                interval: row.try_get("interval")?,
                open_time: row.try_get("open_time")?,
                close_time: row.try_get("close_time")?,
                open: Decimal::from_str(row.try_get("open")?).unwrap_or_default(),
                high: Decimal::from_str(row.try_get("high")?).unwrap_or_default(),
                low: Decimal::from_str(row.try_get("low")?).unwrap_or_default(),
                close: Decimal::from_str(row.try_get("close")?).unwrap_or_default(),
                volume: Decimal::from_str(row.try_get("volume")?).unwrap_or_default(),
                trades: row.try_get("trades")?,
            });
        }
        candles.reverse(); // ascending by close_time
        Ok(candles)
    }
}

pub struct SqliteStreamOffsetRepository {
    pool: SqlitePool,
}

impl SqliteStreamOffsetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamOffsetRepository for SqliteStreamOffsetRepository {
    async fn get(&self, stream_key: &str) -> Result<Option<StreamOffset>> {
        let row = sqlx::query("SELECT * FROM processing_offsets WHERE stream_key = ?")
            .bind(stream_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StreamOffset {
            stream_key: r.try_get("stream_key").unwrap_or_default(),
            last_closed_open_time: r.try_get("last_closed_open_time").unwrap_or_default(),
            last_sync_at: r.try_get("last_sync_at").unwrap_or_default(),
        }))
    }

    async fn upsert(&self, offset: &StreamOffset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_offsets (stream_key, last_closed_open_time, last_sync_at)
            VALUES (?, ?, ?)
            ON CONFLICT(stream_key) DO UPDATE SET
                last_closed_open_time = excluded.last_closed_open_time,
                last_sync_at = excluded.last_sync_at
            "#,
        )
        .bind(&offset.stream_key)
        .bind(offset.last_closed_open_time)
        .bind(offset.last_sync_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert processing offset")?;
        Ok(())
    }
}

pub struct SqliteIndicatorSetRepository {
    pool: SqlitePool,
}

impl SqliteIndicatorSetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndicatorSetRepository for SqliteIndicatorSetRepository {
    async fn upsert(&self, set: &IndicatorSet) -> Result<IndicatorSet> {
        sqlx::query(
            r#"
            INSERT INTO indicator_sets (symbol, ema_fast, ema_slow, atr_window, cfg_hash, status)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, ema_fast, ema_slow, atr_window) DO UPDATE SET status = excluded.status
            "#,
        )
        .bind(&set.symbol)
        .bind(set.ema_fast)
        .bind(set.ema_slow)
        .bind(set.atr_window)
        .bind(&set.cfg_hash)
        .bind(if set.status == IndicatorSetStatus::Active { "ACTIVE" } else { "RETIRED" })
        .execute(&self.pool)
        .await
        .context("Failed to upsert indicator set")?;
        Ok(set.clone())
    }

    async fn active_for_symbol(&self, symbol: &str) -> Result<Vec<IndicatorSet>> {
        let rows = sqlx::query("SELECT * FROM indicator_sets WHERE symbol = ? AND status = 'ACTIVE'")
            .bind(symbol)
            .fetch_all(&self.pool)
            .await?;
        let mut sets = Vec::with_capacity(rows.len());
        for row in rows {
            sets.push(IndicatorSet {
                symbol: row.try_get("symbol")?,
                ema_fast: row.try_get("ema_fast")?,
                ema_slow: row.try_get("ema_slow")?,
                atr_window: row.try_get("atr_window")?,
                cfg_hash: row.try_get("cfg_hash")?,
                status: IndicatorSetStatus::Active,
            });
        }
        Ok(sets)
    }
}

pub struct SqliteIndicatorRepository {
    pool: SqlitePool,
}

impl SqliteIndicatorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndicatorRepository for SqliteIndicatorRepository {
    async fn upsert(&self, snapshot: &IndicatorSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indicators_1m (symbol, close_time, cfg_hash, open, high, low, close, ema_fast, ema_slow, atr_pct)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, close_time, cfg_hash) DO UPDATE SET
                open = excluded.open, high = excluded.high, low = excluded.low, close = excluded.close,
                ema_fast = excluded.ema_fast, ema_slow = excluded.ema_slow, atr_pct = excluded.atr_pct
            "#,
        )
        .bind(&snapshot.symbol)
        .bind(snapshot.close_time)
        .bind(&snapshot.cfg_hash)
        .bind(snapshot.open)
        .bind(snapshot.high)
        .bind(snapshot.low)
        .bind(snapshot.close)
        .bind(snapshot.ema_fast)
        .bind(snapshot.ema_slow)
        .bind(snapshot.atr_pct)
        .execute(&self.pool)
        .await
        .context("Failed to upsert indicator snapshot")?;
        Ok(())
    }

    async fn latest(&self, symbol: &str, cfg_hash: &str) -> Result<Option<IndicatorSnapshot>> {
        let row = sqlx::query(
            "SELECT * FROM indicators_1m WHERE symbol = ? AND cfg_hash = ? ORDER BY close_time DESC LIMIT 1",
        )
        .bind(symbol)
        .bind(cfg_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => Some(IndicatorSnapshot {
                symbol: row.try_get("symbol")?,
                close_time: row.try_get("close_time")?,
                cfg_hash: row.try_get("cfg_hash")?,
                open: row.try_get("open")?,
                high: row.try_get("high")?,
                low: row.try_get("low")?,
                close: row.try_get("close")?,
                ema_fast: row.try_get("ema_fast")?,
                ema_slow: row.try_get("ema_slow")?,
                atr_pct: row.try_get("atr_pct")?,
            }),
            None => None,
        })
    }
}

pub struct SqliteStrategyRepository {
    pool: SqlitePool,
}

impl SqliteStrategyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_strategy(row: &sqlx::sqlite::SqliteRow) -> Result<Strategy> {
        let params_json: String = row.try_get("params_json")?;
        let status_str: String = row.try_get("status")?;
        let dex_str: Option<String> = row.try_get("dex")?;
        Ok(Strategy {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            symbol: row.try_get("symbol")?,
            status: if status_str == "ACTIVE" { StrategyStatus::Active } else { StrategyStatus::Paused },
            indicator_set_cfg_hash: row.try_get("indicator_set_cfg_hash")?,
            params: serde_json::from_str(&params_json).context("Failed to deserialize strategy params")?,
            dex: dex_str.and_then(|s| Dex::from_str(&s).ok()),
            alias: row.try_get("alias")?,
            token0_address: row.try_get("token0_address")?,
            token1_address: row.try_get("token1_address")?,
        })
    }
}

#[async_trait]
impl StrategyRepository for SqliteStrategyRepository {
    async fn active(&self) -> Result<Vec<Strategy>> {
        let rows = sqlx::query("SELECT * FROM strategies WHERE status = 'ACTIVE'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_strategy).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Strategy>> {
        let row = sqlx::query("SELECT * FROM strategies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_strategy).transpose()
    }
}

pub struct SqliteEpisodeRepository {
    pool: SqlitePool,
}

impl SqliteEpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_episode(row: &sqlx::sqlite::SqliteRow) -> Result<Episode> {
        let pool_type_str: String = row.try_get("pool_type")?;
        let mode_str: String = row.try_get("mode_on_open")?;
        let majority_str: String = row.try_get("majority_on_open")?;
        let dex_str: Option<String> = row.try_get("dex")?;
        let atr_streak_json: String = row.try_get("atr_streak_json")?;
        let close_reason_str: Option<String> = row.try_get("close_reason")?;

        Ok(Episode {
            strategy_id: row.try_get("strategy_id")?,
            symbol: row.try_get("symbol")?,
            status: if row.try_get::<String, _>("status")? == "OPEN" {
                EpisodeStatus::Open
            } else {
                EpisodeStatus::Closed
            },
            open_time: row.try_get("open_time")?,
            open_price: row.try_get("open_price")?,
            pa: row.try_get("pa")?,
            pb: row.try_get("pb")?,
            pool_type: PoolType::tier(pool_type_str),
            mode_on_open: if mode_str == "up" { Trend::Up } else { Trend::Down },
            majority_on_open: if majority_str == "token1" { Majority::Token1 } else { Majority::Token2 },
            target_major_pct: row.try_get("target_major_pct")?,
            target_minor_pct: row.try_get("target_minor_pct")?,
            last_event_bar: row.try_get("last_event_bar")?,
            out_above_streak: row.try_get::<i64, _>("out_above_streak")? as u32,
            out_below_streak: row.try_get::<i64, _>("out_below_streak")? as u32,
            atr_streak: serde_json::from_str::<HashMap<String, u32>>(&atr_streak_json).unwrap_or_default(),
            close_time: row.try_get("close_time")?,
            close_price: row.try_get("close_price")?,
            close_reason: close_reason_str.map(|s| close_reason_from_str(&s)),
            dex: dex_str.and_then(|s| Dex::from_str(&s).ok()),
            alias: row.try_get("alias")?,
            token0_address: row.try_get("token0_address")?,
            token1_address: row.try_get("token1_address")?,
        })
    }
}

fn close_reason_from_str(s: &str) -> CloseReason {
    match s {
        "cross_max" => CloseReason::CrossMax,
        "cross_min" => CloseReason::CrossMin,
        "high_vol" => CloseReason::HighVol,
        other => CloseReason::Tighten(other.strip_prefix("tighten_").unwrap_or(other).to_string()),
    }
}

#[async_trait]
impl EpisodeRepository for SqliteEpisodeRepository {
    async fn open_for_strategy(&self, strategy_id: &str) -> Result<Option<Episode>> {
        let row = sqlx::query(
            "SELECT * FROM strategy_episodes WHERE strategy_id = ? AND status = 'OPEN' ORDER BY open_time DESC LIMIT 1",
        )
        .bind(strategy_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_episode).transpose()
    }

    async fn upsert_open(&self, strategy_id: &str, episode: &Episode) -> Result<()> {
        let atr_streak_json = serde_json::to_string(&episode.atr_streak)?;
        let existing = sqlx::query(
            "SELECT id FROM strategy_episodes WHERE strategy_id = ? AND status = 'OPEN' AND open_time = ?",
        )
        .bind(strategy_id)
        .bind(episode.open_time)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            let id: i64 = row.try_get("id")?;
            sqlx::query(
                r#"
                UPDATE strategy_episodes
                SET last_event_bar = ?, out_above_streak = ?, out_below_streak = ?, atr_streak_json = ?
                WHERE id = ?
                "#,
            )
            .bind(episode.last_event_bar)
            .bind(episode.out_above_streak as i64)
            .bind(episode.out_below_streak as i64)
            .bind(atr_streak_json)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update open episode")?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO strategy_episodes (
                    strategy_id, symbol, status, open_time, open_price, pa, pb, pool_type,
                    mode_on_open, majority_on_open, target_major_pct, target_minor_pct,
                    last_event_bar, out_above_streak, out_below_streak, atr_streak_json,
                    dex, alias, token0_address, token1_address
                ) VALUES (?, ?, 'OPEN', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(strategy_id)
            .bind(&episode.symbol)
            .bind(episode.open_time)
            .bind(episode.open_price)
            .bind(episode.pa)
            .bind(episode.pb)
            .bind(episode.pool_type.key())
            .bind(if episode.mode_on_open == Trend::Up { "up" } else { "down" })
            .bind(if episode.majority_on_open == Majority::Token1 { "token1" } else { "token2" })
            .bind(episode.target_major_pct)
            .bind(episode.target_minor_pct)
            .bind(episode.last_event_bar)
            .bind(episode.out_above_streak as i64)
            .bind(episode.out_below_streak as i64)
            .bind(atr_streak_json)
            .bind(episode.dex.map(|d| d.to_string()))
            .bind(&episode.alias)
            .bind(&episode.token0_address)
            .bind(&episode.token1_address)
            .execute(&self.pool)
            .await
            .context("Failed to insert new episode")?;
        }
        Ok(())
    }

    async fn close(
        &self,
        strategy_id: &str,
        close_time: i64,
        close_price: f64,
        close_reason: &CloseReason,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE strategy_episodes
            SET status = 'CLOSED', close_time = ?, close_price = ?, close_reason = ?
            WHERE strategy_id = ? AND status = 'OPEN'
            "#,
        )
        .bind(close_time)
        .bind(close_price)
        .bind(close_reason.to_string())
        .bind(strategy_id)
        .execute(&self.pool)
        .await
        .context("Failed to close episode")?;
        Ok(())
    }
}

pub struct SqliteSignalRepository {
    pool: SqlitePool,
}

impl SqliteSignalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_signal(row: &sqlx::sqlite::SqliteRow) -> Result<(String, Signal)> {
        let strategy_id: String = row.try_get("strategy_id")?;
        let steps_json: String = row.try_get("steps_json")?;
        let episode_json: String = row.try_get("episode_json")?;
        let status_str: String = row.try_get("status")?;
        let signal_type_col: String = row.try_get("signal_type")?;
        let signal = Signal {
            strategy_id: strategy_id.clone(),
            ts: row.try_get("ts")?,
            signal_type: signal_type_from_str(&signal_type_col),
            status: signal_status_from_str(&status_str),
            attempts: row.try_get::<i64, _>("attempts")? as u32,
            cfg_hash: row.try_get("cfg_hash")?,
            symbol: row.try_get("symbol")?,
            steps: serde_json::from_str::<Vec<Step>>(&steps_json).context("Failed to deserialize steps")?,
            episode: serde_json::from_str(&episode_json).context("Failed to deserialize episode snapshot")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        };
        Ok((strategy_id, signal))
    }
}

#[async_trait]
impl SignalRepository for SqliteSignalRepository {
    async fn upsert(&self, strategy_id: &str, signal: &Signal) -> Result<()> {
        let steps_json = serde_json::to_string(&signal.steps)?;
        let episode_json = serde_json::to_string(&signal.episode)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO signals (
                strategy_id, ts, signal_type, status, attempts, cfg_hash, symbol,
                steps_json, episode_json, last_error, created_at, updated_at
            ) VALUES (?, ?, ?, 'PENDING', 0, ?, ?, ?, ?, NULL, ?, ?)
            ON CONFLICT(strategy_id, ts, signal_type) DO UPDATE SET
                status = 'PENDING', attempts = 0, cfg_hash = excluded.cfg_hash,
                steps_json = excluded.steps_json, episode_json = excluded.episode_json,
                last_error = NULL, updated_at = excluded.updated_at
            "#,
        )
        .bind(strategy_id)
        .bind(signal.ts)
        .bind(signal_type_str(signal.signal_type))
        .bind(&signal.cfg_hash)
        .bind(&signal.symbol)
        .bind(steps_json)
        .bind(episode_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to upsert signal")?;
        Ok(())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<(String, Signal)>> {
        let rows = sqlx::query("SELECT * FROM signals WHERE status = 'PENDING' ORDER BY created_at ASC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_signal).collect()
    }

    async fn mark_executed(&self, strategy_id: &str, ts: i64, signal_type: SignalType) -> Result<()> {
        sqlx::query(
            "UPDATE signals SET status = 'EXECUTED', updated_at = ? WHERE strategy_id = ? AND ts = ? AND signal_type = ?",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(strategy_id)
        .bind(ts)
        .bind(signal_type_str(signal_type))
        .execute(&self.pool)
        .await
        .context("Failed to mark signal executed")?;
        Ok(())
    }

    async fn mark_failure(&self, strategy_id: &str, ts: i64, signal_type: SignalType, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE signals
            SET status = 'FAILED', attempts = attempts + 1, last_error = ?, updated_at = ?
            WHERE strategy_id = ? AND ts = ? AND signal_type = ?
            "#,
        )
        .bind(error)
        .bind(chrono::Utc::now().timestamp())
        .bind(strategy_id)
        .bind(ts)
        .bind(signal_type_str(signal_type))
        .execute(&self.pool)
        .await
        .context("Failed to mark signal failure")?;
        Ok(())
    }
}
