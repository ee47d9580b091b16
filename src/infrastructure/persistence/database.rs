use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Singleton database wrapper
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles_1m (
                symbol TEXT NOT NULL,
                interval TEXT NOT NULL,
                open_time INTEGER NOT NULL,
                close_time INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                trades INTEGER NOT NULL,
                UNIQUE(symbol, interval, open_time)
            );
            CREATE INDEX IF NOT EXISTS idx_candles_1m_symbol_interval_close
            ON candles_1m (symbol, interval, close_time);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candles_1m table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processing_offsets (
                stream_key TEXT PRIMARY KEY,
                last_closed_open_time INTEGER NOT NULL,
                last_sync_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create processing_offsets table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indicator_sets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                ema_fast INTEGER NOT NULL,
                ema_slow INTEGER NOT NULL,
                atr_window INTEGER NOT NULL,
                cfg_hash TEXT NOT NULL,
                status TEXT NOT NULL,
                UNIQUE(symbol, ema_fast, ema_slow, atr_window)
            );
            CREATE INDEX IF NOT EXISTS idx_indicator_sets_symbol_status
            ON indicator_sets (symbol, status);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create indicator_sets table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indicators_1m (
                symbol TEXT NOT NULL,
                close_time INTEGER NOT NULL,
                cfg_hash TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                ema_fast REAL NOT NULL,
                ema_slow REAL NOT NULL,
                atr_pct REAL NOT NULL,
                UNIQUE(symbol, close_time, cfg_hash)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create indicators_1m table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                status TEXT NOT NULL,
                indicator_set_cfg_hash TEXT NOT NULL,
                params_json TEXT NOT NULL,
                dex TEXT,
                alias TEXT,
                token0_address TEXT,
                token1_address TEXT,
                UNIQUE(name, symbol)
            );
            CREATE INDEX IF NOT EXISTS idx_strategies_status_symbol ON strategies (status, symbol);
            CREATE INDEX IF NOT EXISTS idx_strategies_cfg_hash_status
            ON strategies (indicator_set_cfg_hash, status);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create strategies table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_episodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                status TEXT NOT NULL,
                open_time INTEGER NOT NULL,
                open_price REAL NOT NULL,
                pa REAL NOT NULL,
                pb REAL NOT NULL,
                pool_type TEXT NOT NULL,
                mode_on_open TEXT NOT NULL,
                majority_on_open TEXT NOT NULL,
                target_major_pct REAL NOT NULL,
                target_minor_pct REAL NOT NULL,
                last_event_bar INTEGER NOT NULL,
                out_above_streak INTEGER NOT NULL,
                out_below_streak INTEGER NOT NULL,
                atr_streak_json TEXT NOT NULL,
                close_time INTEGER,
                close_price REAL,
                close_reason TEXT,
                dex TEXT,
                alias TEXT,
                token0_address TEXT,
                token1_address TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_strategy_episodes_strategy_status
            ON strategy_episodes (strategy_id, status);
            CREATE INDEX IF NOT EXISTS idx_strategy_episodes_strategy_open_time
            ON strategy_episodes (strategy_id, open_time DESC);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create strategy_episodes table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                signal_type TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                cfg_hash TEXT NOT NULL,
                symbol TEXT NOT NULL,
                steps_json TEXT NOT NULL,
                episode_json TEXT NOT NULL,
                last_error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(strategy_id, ts, signal_type)
            );
            CREATE INDEX IF NOT EXISTS idx_signals_status_created
            ON signals (status, created_at DESC);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signals table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
