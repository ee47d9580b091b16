//! Execution Pipeline: runs a pending signal's ordered steps against the
//! vault, retrying each step independently before giving up on the whole
//! signal. `SWAP_EXACT_IN` is sized at the moment it runs, never ahead of
//! time, from a fresh vault status read.

use crate::domain::episode::Episode;
use crate::domain::errors::{PipelineError, VaultError};
use crate::domain::ports::VaultClient;
use crate::domain::repositories::SignalRepository;
use crate::domain::signal::{Signal, Step};
use crate::domain::types::Majority;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct ExecutionPipeline {
    vault: Arc<dyn VaultClient>,
    max_retries: u32,
    base_backoff: Duration,
}

impl ExecutionPipeline {
    pub fn new(vault: Arc<dyn VaultClient>, max_retries: u32, base_backoff: Duration) -> Self {
        Self { vault, max_retries, base_backoff }
    }

    /// Fetches up to `batch_size` pending signals and attempts to execute
    /// each in full. A signal whose steps all succeed is marked executed; a
    /// hard failure on any step marks the signal failed and moves on.
    pub async fn execute_once(&self, signals: &dyn SignalRepository, batch_size: usize) -> Result<()> {
        let pending = signals.list_pending(batch_size).await?;
        for (strategy_id, signal) in pending {
            match self.process_signal(&signal).await {
                Ok(()) => {
                    info!(%strategy_id, ts = signal.ts, "signal executed");
                    signals.mark_executed(&strategy_id, signal.ts, signal.signal_type).await?;
                }
                Err(e) => {
                    warn!(%strategy_id, ts = signal.ts, error = %e, "signal execution failed");
                    signals
                        .mark_failure(&strategy_id, signal.ts, signal.signal_type, &e.to_string())
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn process_signal(&self, signal: &Signal) -> Result<(), PipelineError> {
        if signal.steps.is_empty() {
            return Err(PipelineError::EmptyPlan {
                strategy_id: signal.strategy_id.clone(),
                ts: signal.ts,
            });
        }

        for step in &signal.steps {
            self.run_step_with_retry(step, &signal.episode).await?;
        }
        Ok(())
    }

    async fn run_step_with_retry(&self, step: &Step, episode: &Episode) -> Result<(), PipelineError> {
        let mut last_err = None;

        for attempt in 1..=self.max_retries {
            match self.run_step(step, episode).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(step = step.action_name(), attempt, max = self.max_retries, error = %e, "step failed");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.base_backoff * attempt).await;
                    }
                }
            }
        }

        Err(PipelineError::StepFailed {
            step: step.action_name().to_string(),
            attempts: self.max_retries,
            source: last_err.expect("loop runs at least once"),
        })
    }

    async fn run_step(&self, step: &Step, episode: &Episode) -> Result<(), VaultError> {
        match step {
            Step::Collect { dex, alias } => {
                self.vault.collect(*dex, alias).await?;
                Ok(())
            }
            Step::Withdraw { dex, alias, mode } => {
                self.vault.withdraw(*dex, alias, *mode).await?;
                Ok(())
            }
            Step::SwapExactIn { dex, alias } => self.run_swap(*dex, alias, episode).await,
            Step::Rebalance { dex, alias, lower_price, upper_price } => {
                self.vault.rebalance(*dex, alias, *lower_price, *upper_price).await?;
                Ok(())
            }
            Step::NoopLegacy { .. } => Ok(()),
        }
    }

    /// Sizes and sends the proportion-rebalancing swap from a fresh vault
    /// status read. If the vault can't report a usable price, the step is
    /// treated as a no-op rather than a failure: there's nothing safe to
    /// compute a trade size from.
    async fn run_swap(&self, dex: crate::domain::types::Dex, alias: &str, episode: &Episode) -> Result<(), VaultError> {
        let status = self.vault.status(dex, alias).await?;
        if status.p_t1_t0 <= 0.0 {
            return Ok(());
        }

        let token0 = episode
            .token0_address
            .as_deref()
            .ok_or_else(|| VaultError::MissingField("token0_address".to_string()))?;
        let token1 = episode
            .token1_address
            .as_deref()
            .ok_or_else(|| VaultError::MissingField("token1_address".to_string()))?;

        let usd0 = status.amt0 * status.p_t1_t0;
        let usd1 = status.amt1;
        let total_usd = usd0 + usd1;

        let major_is_token0 = episode.majority_on_open == Majority::Token2;
        let major_curr_usd = if major_is_token0 { usd0 } else { usd1 };
        let target_major_usd = total_usd * episode.target_major_pct;
        let delta_usd = target_major_usd - major_curr_usd;

        let (token_in, token_out, amount_in_usd) = match (major_is_token0, delta_usd > 0.0) {
            (true, true) => (token1, token0, delta_usd),
            (true, false) => (token0, token1, -delta_usd),
            (false, true) => (token0, token1, delta_usd),
            (false, false) => (token1, token0, -delta_usd),
        };

        self.vault.swap_exact_in(dex, alias, token_in, token_out, amount_in_usd).await?;
        Ok(())
    }
}
