use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

pub mod shutdown_service;

use crate::application::bootstrap::{
    persistence::{PersistenceBootstrap, PersistenceHandle},
    services::{ServicesBootstrap, ServicesHandle},
};
use crate::application::ingestion::IngestionSupervisor;
use crate::application::pipeline::ExecutionPipeline;
use crate::application::system::shutdown_service::ShutdownService;
use crate::config::Config;
use crate::infrastructure::binance_ws::BinanceKlineStream;

/// Handle returned once the background tasks are running. Holding it keeps
/// the tasks alive; dropping it does not stop them — call `shutdown` for that.
pub struct SystemHandle {
    shutdown: ShutdownService,
}

impl SystemHandle {
    pub async fn shutdown(self) {
        self.shutdown.shutdown().await;
    }
}

pub struct Application {
    pub config: Config,
    pub persistence: PersistenceHandle,
    pub services: ServicesHandle,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!(symbol = %config.symbol, interval = %config.interval, "building application");

        let persistence = PersistenceBootstrap::init(&config).await?;
        let services = ServicesBootstrap::init(&config).await?;

        Ok(Self { config, persistence, services })
    }

    /// Spawns the ingestion websocket task and the execution pipeline poll
    /// loop, wires them to a shared stop signal, and registers a ctrl-c
    /// handler that triggers a coordinated shutdown.
    pub async fn start(self) -> Result<SystemHandle> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (candle_tx, candle_rx) = mpsc::channel(1000);

        let stream = BinanceKlineStream::new(
            self.config.feed_ws_base_url.clone(),
            self.config.symbol.clone(),
            self.config.interval.clone(),
            self.config.ws_reconnect_initial_backoff,
            self.config.ws_reconnect_max_backoff,
            self.config.ws_ping_interval,
            self.config.ws_open_timeout,
        );
        let ws_stop_rx = stop_rx.clone();
        let ws_handle = tokio::spawn(async move {
            stream.run(candle_tx, ws_stop_rx).await;
        });

        let supervisor = IngestionSupervisor::new(
            self.persistence.candle_repository.clone(),
            self.persistence.stream_offset_repository.clone(),
            self.persistence.indicator_set_repository.clone(),
            self.persistence.indicator_repository.clone(),
            self.persistence.strategy_repository.clone(),
            self.persistence.episode_repository.clone(),
            self.persistence.signal_repository.clone(),
            self.services.vault.clone(),
        );
        let stream_key = self.config.stream_key();
        let ingestion_handle = tokio::spawn(async move {
            supervisor.run(candle_rx, stream_key).await;
        });

        let pipeline = ExecutionPipeline::new(
            self.services.vault.clone(),
            self.config.max_retries,
            self.config.base_backoff,
        );
        let signal_repository = self.persistence.signal_repository.clone();
        let poll_interval = self.config.pipeline_poll_interval;
        let batch_size = self.config.pipeline_batch_size;
        let mut pipeline_stop_rx = stop_rx.clone();
        let pipeline_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = pipeline.execute_once(signal_repository.as_ref(), batch_size).await {
                            error!(error = %e, "execution pipeline cycle failed");
                        }
                    }
                    _ = pipeline_stop_rx.changed() => {
                        if *pipeline_stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        let shutdown = ShutdownService::new(
            stop_tx,
            vec![
                ("ingestion_websocket", ws_handle, std::time::Duration::from_secs(5)),
                ("ingestion_supervisor", ingestion_handle, std::time::Duration::from_secs(10)),
                ("execution_pipeline", pipeline_handle, std::time::Duration::from_secs(10)),
            ],
        );

        Ok(SystemHandle { shutdown })
    }
}
