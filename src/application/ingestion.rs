//! Ingestion Supervisor: owns the candle channel fed by the websocket
//! client, persists each closed candle, advances the stream watermark, and
//! drives indicator computation and strategy evaluation for every active
//! indicator set bound to the candle's symbol.

use crate::application::episode_engine;
use crate::domain::candle::{Candle, StreamOffset};
use crate::domain::indicators::compute_snapshot;
use crate::domain::ports::VaultClient;
use crate::domain::repositories::{
    CandleRepository, EpisodeRepository, IndicatorRepository, IndicatorSetRepository,
    SignalRepository, StrategyRepository, StreamOffsetRepository,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct IngestionSupervisor {
    candle_repo: Arc<dyn CandleRepository>,
    offset_repo: Arc<dyn StreamOffsetRepository>,
    indicator_set_repo: Arc<dyn IndicatorSetRepository>,
    indicator_repo: Arc<dyn IndicatorRepository>,
    strategy_repo: Arc<dyn StrategyRepository>,
    episode_repo: Arc<dyn EpisodeRepository>,
    signal_repo: Arc<dyn SignalRepository>,
    vault: Arc<dyn VaultClient>,
}

impl IngestionSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        candle_repo: Arc<dyn CandleRepository>,
        offset_repo: Arc<dyn StreamOffsetRepository>,
        indicator_set_repo: Arc<dyn IndicatorSetRepository>,
        indicator_repo: Arc<dyn IndicatorRepository>,
        strategy_repo: Arc<dyn StrategyRepository>,
        episode_repo: Arc<dyn EpisodeRepository>,
        signal_repo: Arc<dyn SignalRepository>,
        vault: Arc<dyn VaultClient>,
    ) -> Self {
        Self {
            candle_repo,
            offset_repo,
            indicator_set_repo,
            indicator_repo,
            strategy_repo,
            episode_repo,
            signal_repo,
            vault,
        }
    }

    /// Drains `candles` until the sender side is dropped (i.e. the websocket
    /// client stopped). One malformed/failed candle never kills the loop.
    pub async fn run(&self, mut candles: mpsc::Receiver<Candle>, stream_key: String) {
        while let Some(candle) = candles.recv().await {
            if let Err(e) = self.handle_candle(&candle, &stream_key).await {
                warn!(symbol = %candle.symbol, open_time = candle.open_time, error = %e, "failed to process closed candle");
            }
        }
        debug!("ingestion supervisor stopped: candle channel closed");
    }

    async fn handle_candle(&self, candle: &Candle, stream_key: &str) -> Result<()> {
        self.candle_repo.upsert_many(std::slice::from_ref(candle)).await?;
        self.offset_repo
            .upsert(&StreamOffset {
                stream_key: stream_key.to_string(),
                last_closed_open_time: candle.open_time,
                last_sync_at: chrono::Utc::now().timestamp(),
            })
            .await?;

        let sets = self.indicator_set_repo.active_for_symbol(&candle.symbol).await?;
        for set in sets {
            let history = self
                .candle_repo
                .latest(&candle.symbol, &candle.interval, set.required_bars())
                .await?;

            let Some(snapshot) =
                compute_snapshot(&history, set.ema_fast, set.ema_slow, set.atr_window, &set.cfg_hash)
            else {
                continue;
            };

            self.indicator_repo.upsert(&snapshot).await?;

            episode_engine::evaluate_for_snapshot(
                self.strategy_repo.as_ref(),
                self.episode_repo.as_ref(),
                self.signal_repo.as_ref(),
                self.vault.as_ref(),
                &set.cfg_hash,
                &snapshot,
            )
            .await?;
        }

        Ok(())
    }
}
