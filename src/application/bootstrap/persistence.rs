use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::domain::repositories::{
    CandleRepository, EpisodeRepository, IndicatorRepository, IndicatorSetRepository,
    SignalRepository, StrategyRepository, StreamOffsetRepository,
};
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::{
    SqliteCandleRepository, SqliteEpisodeRepository, SqliteIndicatorRepository,
    SqliteIndicatorSetRepository, SqliteSignalRepository, SqliteStrategyRepository,
    SqliteStreamOffsetRepository,
};

pub struct PersistenceHandle {
    pub db: Database,
    pub candle_repository: Arc<dyn CandleRepository>,
    pub stream_offset_repository: Arc<dyn StreamOffsetRepository>,
    pub indicator_set_repository: Arc<dyn IndicatorSetRepository>,
    pub indicator_repository: Arc<dyn IndicatorRepository>,
    pub strategy_repository: Arc<dyn StrategyRepository>,
    pub episode_repository: Arc<dyn EpisodeRepository>,
    pub signal_repository: Arc<dyn SignalRepository>,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(config: &Config) -> Result<PersistenceHandle> {
        info!(database_url = %config.database_url, "initializing persistence layer");

        let db = Database::new(&config.database_url)
            .await
            .context("failed to initialize database")?;

        Ok(PersistenceHandle {
            candle_repository: Arc::new(SqliteCandleRepository::new(db.pool.clone())),
            stream_offset_repository: Arc::new(SqliteStreamOffsetRepository::new(db.pool.clone())),
            indicator_set_repository: Arc::new(SqliteIndicatorSetRepository::new(db.pool.clone())),
            indicator_repository: Arc::new(SqliteIndicatorRepository::new(db.pool.clone())),
            strategy_repository: Arc::new(SqliteStrategyRepository::new(db.pool.clone())),
            episode_repository: Arc::new(SqliteEpisodeRepository::new(db.pool.clone())),
            signal_repository: Arc::new(SqliteSignalRepository::new(db.pool.clone())),
            db,
        })
    }
}
