//! Evaluates every active strategy tied to an indicator set against a fresh
//! snapshot: runs the episode state machine, persists whatever changed, and
//! reconciles a triggered transition into a pending signal.

use crate::application::reconciler;
use crate::domain::episode::{evaluate_tick, Episode, SnapshotInput, TickOutcome, VaultBinding};
use crate::domain::indicators::IndicatorSnapshot;
use crate::domain::ports::VaultClient;
use crate::domain::repositories::{EpisodeRepository, SignalRepository, StrategyRepository};
use crate::domain::signal::{Signal, SignalStatus};
use crate::domain::strategy::Strategy;
use anyhow::Result;
use tracing::{info, warn};

pub async fn evaluate_for_snapshot(
    strategy_repo: &dyn StrategyRepository,
    episode_repo: &dyn EpisodeRepository,
    signal_repo: &dyn SignalRepository,
    vault: &dyn VaultClient,
    cfg_hash: &str,
    snapshot: &IndicatorSnapshot,
) -> Result<()> {
    let strategies = strategy_repo.active().await?;
    for strategy in strategies.iter().filter(|s| s.indicator_set_cfg_hash == cfg_hash) {
        if let Err(e) = evaluate_strategy(strategy, episode_repo, signal_repo, vault, snapshot).await {
            warn!(strategy_id = %strategy.id, error = %e, "failed to evaluate strategy tick");
        }
    }
    Ok(())
}

async fn evaluate_strategy(
    strategy: &Strategy,
    episode_repo: &dyn EpisodeRepository,
    signal_repo: &dyn SignalRepository,
    vault: &dyn VaultClient,
    snapshot: &IndicatorSnapshot,
) -> Result<()> {
    let current = episode_repo.open_for_strategy(&strategy.id).await?;

    let snapshot_input = SnapshotInput {
        symbol: strategy.symbol.clone(),
        close_time: snapshot.close_time,
        price: snapshot.close,
        ema_fast: snapshot.ema_fast,
        ema_slow: snapshot.ema_slow,
        atr_pct: snapshot.atr_pct,
    };
    let binding = VaultBinding {
        dex: strategy.dex,
        alias: strategy.alias.clone(),
        token0_address: strategy.token0_address.clone(),
        token1_address: strategy.token1_address.clone(),
    };

    let outcome = evaluate_tick(&strategy.id, current.as_ref(), &snapshot_input, &strategy.params, &binding);

    match outcome {
        TickOutcome::NoTrigger(update) => {
            let mut episode = current.expect("NoTrigger only returned for an existing open episode");
            episode.out_above_streak = update.out_above_streak;
            episode.out_below_streak = update.out_below_streak;
            episode.last_event_bar = update.last_event_bar;
            if let Some(atr_streak) = update.atr_streak {
                episode.atr_streak = atr_streak;
            }
            episode_repo.upsert_open(&strategy.id, &episode).await?;
        }
        TickOutcome::FirstOpen { new_episode } => {
            info!(strategy_id = %strategy.id, "opening first episode");
            episode_repo.upsert_open(&strategy.id, &new_episode).await?;
            emit_signal(signal_repo, vault, &strategy.id, &strategy.indicator_set_cfg_hash, &new_episode).await?;
        }
        TickOutcome::Transition { close_time, close_price, close_reason, streaks, new_episode } => {
            info!(strategy_id = %strategy.id, reason = %close_reason, "episode transition");
            episode_repo.close(&strategy.id, close_time, close_price, &close_reason).await?;
            let _ = streaks; // the closed episode's streaks are moot; the new episode starts fresh
            episode_repo.upsert_open(&strategy.id, &new_episode).await?;
            emit_signal(signal_repo, vault, &strategy.id, &strategy.indicator_set_cfg_hash, &new_episode).await?;
        }
    }

    Ok(())
}

async fn emit_signal(
    signal_repo: &dyn SignalRepository,
    vault: &dyn VaultClient,
    strategy_id: &str,
    cfg_hash: &str,
    episode: &Episode,
) -> Result<()> {
    let Some(plan) = reconciler::reconcile(vault, episode).await? else {
        return Ok(());
    };

    let now = chrono::Utc::now().timestamp();
    let signal = Signal {
        strategy_id: strategy_id.to_string(),
        ts: episode.open_time,
        signal_type: plan.signal_type,
        status: SignalStatus::Pending,
        attempts: 0,
        cfg_hash: cfg_hash.to_string(),
        symbol: episode.symbol.clone(),
        steps: plan.steps,
        episode: episode.clone(),
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    signal_repo.upsert(strategy_id, &signal).await?;
    Ok(())
}
