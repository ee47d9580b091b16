//! Episode state machine: the per-strategy band, its streaks, and regime
//! transitions. Pure decision logic — no I/O. The use-case layer
//! (`application::episode_engine`) is responsible for loading the current
//! episode, calling [`evaluate_tick`], and persisting the outcome.

use crate::domain::strategy::StrategyParams;
use crate::domain::types::{CloseReason, Dex, EpisodeStatus, Majority, PoolType, Trend};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Absolute floor below which Pa/Pb are never allowed, and the minimum pad
/// keeping the open price strictly inside the band.
const EPS_POS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub strategy_id: String,
    pub symbol: String,
    pub status: EpisodeStatus,
    pub open_time: i64,
    pub open_price: f64,
    pub pa: f64,
    pub pb: f64,
    pub pool_type: PoolType,
    pub mode_on_open: Trend,
    pub majority_on_open: Majority,
    pub target_major_pct: f64,
    pub target_minor_pct: f64,
    pub last_event_bar: i64,
    pub out_above_streak: u32,
    pub out_below_streak: u32,
    pub atr_streak: HashMap<String, u32>,
    pub close_time: Option<i64>,
    pub close_price: Option<f64>,
    pub close_reason: Option<CloseReason>,
    pub dex: Option<Dex>,
    pub alias: Option<String>,
    pub token0_address: Option<String>,
    pub token1_address: Option<String>,
}

/// On-chain vault binding a strategy carries over to every episode it opens.
#[derive(Debug, Clone, Default)]
pub struct VaultBinding {
    pub dex: Option<Dex>,
    pub alias: Option<String>,
    pub token0_address: Option<String>,
    pub token1_address: Option<String>,
}

/// The indicator snapshot values an episode tick is evaluated against.
#[derive(Debug, Clone)]
pub struct SnapshotInput {
    pub symbol: String,
    pub close_time: i64,
    pub price: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub atr_pct: f64,
}

/// Clamp a candidate band so `Pa < P < Pb` with strict epsilon separation.
pub fn ensure_valid_band(pa: f64, pb: f64, p: f64) -> (f64, f64) {
    let mut pa = EPS_POS.max(pa);
    let mut pb = (pa + EPS_POS).max(pb);
    let mid_pad = EPS_POS * 1.0_f64.max(p);
    pa = (p - mid_pad).min(pa);
    pb = (p + mid_pad).max(pb);
    if !(pa < pb) {
        pa = p - mid_pad;
        pb = p + mid_pad;
    }
    (pa, pb)
}

/// Scale a base (below, above) skew to a target total width, splitting evenly
/// if the base skew carries no information (`base_sum <= 0`).
pub fn scale_to_total_width(pct_below_base: f64, pct_above_base: f64, total_width_pct: f64) -> (f64, f64) {
    let base_sum = pct_below_base + pct_above_base;
    if base_sum <= 0.0 {
        let half = (total_width_pct / 2.0).max(1e-12);
        return (half, half);
    }
    let scale = total_width_pct / base_sum;
    (pct_below_base * scale, pct_above_base * scale)
}

fn total_width_for(pool_type: &PoolType, params: &StrategyParams) -> f64 {
    match pool_type {
        PoolType::Standard => params.standard_max_major_side_pct,
        PoolType::HighVol => params.high_vol_max_major_side_pct,
        PoolType::Tier(name) => params
            .find_tier(name)
            .map(|t| t.max_major_side_pct)
            .unwrap_or(params.standard_max_major_side_pct),
    }
}

/// Result of sizing a band for a given trend/pool_type, before the ·10
/// target-pct scaling is applied.
pub struct BandPick {
    pub pa: f64,
    pub pb: f64,
    pub pct_below_base: f64,
    pub pct_above_base: f64,
}

/// Build the candidate band for `pool_type` at price `p` with trend `trend`.
///
/// The skew base depends on `pool_type`: high_vol uses a steep 0.09/0.01
/// split, the *last configured tier* (by insertion order, not by threshold)
/// uses a symmetric 0.05/0.05 split regardless of trend, and everything else
/// (standard, and any non-last tier) uses the strategy's configured
/// `skew_low_pct`/`skew_high_pct`.
pub fn pick_band_for_trend(p: f64, trend: Trend, params: &StrategyParams, pool_type: &PoolType) -> BandPick {
    let pool_key = pool_type.key();
    let last_tier_name = params.tiers.last().map(|t| t.name.as_str());

    let (pct_below_base, pct_above_base) = if pool_key == "high_vol" {
        match trend {
            Trend::Down => (0.09, 0.01),
            Trend::Up => (0.01, 0.09),
        }
    } else if Some(pool_key) == last_tier_name {
        (0.05, 0.05)
    } else {
        match trend {
            Trend::Down => (params.skew_low_pct, params.skew_high_pct),
            Trend::Up => (params.skew_high_pct, params.skew_low_pct),
        }
    };

    let total_width_pct = total_width_for(pool_type, params).max(2e-6);
    let (pct_below, pct_above) = scale_to_total_width(pct_below_base, pct_above_base, total_width_pct);
    let pa = p * (1.0 - pct_below);
    let pb = p * (1.0 + pct_above);
    let (pa, pb) = ensure_valid_band(pa, pb, p);
    BandPick { pa, pb, pct_below_base, pct_above_base }
}

/// `target_major_pct`/`target_minor_pct`: the pre-scale base skew times 10.
/// Preserved bit-for-bit including the risk that it may exceed 1.0 — see
/// the episode engine's runtime sizing, which treats it as a raw fraction.
pub fn target_pcts(majority: Majority, pct_below_base: f64, pct_above_base: f64) -> (f64, f64) {
    match majority {
        Majority::Token1 => (pct_below_base * 10.0, pct_above_base * 10.0),
        Majority::Token2 => (pct_above_base * 10.0, pct_below_base * 10.0),
    }
}

/// Update the confirmed-breakout streaks for one bar. Re-entry into the band
/// resets both counters; no change on the confirming side does not persist
/// partial progress across a re-entry.
pub fn update_breakout_streaks(p: f64, pa: f64, pb: f64, eps: f64, out_above: u32, out_below: u32) -> (u32, u32) {
    let above = p > pb * (1.0 + eps);
    let below = p < pa * (1.0 - eps);
    if above {
        (out_above + 1, 0)
    } else if below {
        (0, out_below + 1)
    } else {
        (0, 0)
    }
}

/// Scan tiers ascending by threshold for a tightening trigger. Stops
/// scanning entirely (no trigger) once it reaches a tier equal to the
/// current pool_type; tiers the current pool_type isn't allowed to enter
/// from are skipped without resetting their streak.
pub fn scan_tiers(
    pool_type_cur: &PoolType,
    atr_pct: f64,
    params: &StrategyParams,
    streaks: &mut HashMap<String, u32>,
) -> Option<String> {
    let pool_key = pool_type_cur.key();
    for tier in params.tiers_ascending() {
        if pool_key == tier.name {
            break;
        }
        if !tier.allowed_from.iter().any(|a| a == pool_key) {
            continue;
        }
        let entry = streaks.entry(tier.name.clone()).or_insert(0);
        if atr_pct <= tier.atr_pct_threshold {
            *entry += 1;
        } else {
            *entry = 0;
        }
        if *entry >= tier.bars_required {
            return Some(tier.name.clone());
        }
    }
    None
}

fn next_pool_type_for_trigger(trigger: &CloseReason, params: &StrategyParams) -> PoolType {
    match trigger {
        CloseReason::CrossMax | CloseReason::CrossMin => match params.narrowest_tier() {
            Some(tier) => PoolType::tier(tier.name.clone()),
            None => PoolType::Standard,
        },
        CloseReason::HighVol => PoolType::HighVol,
        CloseReason::Tighten(name) => match params.find_tier(name) {
            Some(tier) => PoolType::tier(tier.name.clone()),
            None => PoolType::Standard,
        },
    }
}

fn initial_atr_streaks(params: &StrategyParams) -> HashMap<String, u32> {
    params.tiers.iter().map(|t| (t.name.clone(), 0)).collect()
}

fn open_episode(
    strategy_id: &str,
    symbol: &str,
    ts: i64,
    p: f64,
    trend: Trend,
    params: &StrategyParams,
    pool_type: PoolType,
    vault: &VaultBinding,
) -> Episode {
    let pick = pick_band_for_trend(p, trend, params, &pool_type);
    let majority = Majority::for_trend(trend);
    let (target_major_pct, target_minor_pct) = target_pcts(majority, pick.pct_below_base, pick.pct_above_base);
    if !(0.0..=1.0).contains(&target_major_pct) {
        warn!(strategy_id, target_major_pct, "target_major_pct outside (0,1] — preserving raw value");
    }
    Episode {
        strategy_id: strategy_id.to_string(),
        symbol: symbol.to_string(),
        status: EpisodeStatus::Open,
        open_time: ts,
        open_price: p,
        pa: pick.pa,
        pb: pick.pb,
        pool_type,
        mode_on_open: trend,
        majority_on_open: majority,
        target_major_pct,
        target_minor_pct,
        last_event_bar: 0,
        out_above_streak: 0,
        out_below_streak: 0,
        atr_streak: initial_atr_streaks(params),
        close_time: None,
        close_price: None,
        close_reason: None,
        dex: vault.dex,
        alias: vault.alias.clone(),
        token0_address: vault.token0_address.clone(),
        token1_address: vault.token1_address.clone(),
    }
}

/// Fields to persist on the still-open episode even when no trigger fired.
#[derive(Debug, Clone, PartialEq)]
pub struct StreakUpdate {
    pub out_above_streak: u32,
    pub out_below_streak: u32,
    pub last_event_bar: i64,
    pub atr_streak: Option<HashMap<String, u32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No OPEN episode existed; a first standard-width band was opened.
    FirstOpen { new_episode: Episode },
    /// An OPEN episode persists; only its streak counters change.
    NoTrigger(StreakUpdate),
    /// The OPEN episode closed and a new one opened in its place.
    Transition {
        close_time: i64,
        close_price: f64,
        close_reason: CloseReason,
        streaks: StreakUpdate,
        new_episode: Episode,
    },
}

/// Evaluate one (strategy, closed candle) tick against the current OPEN
/// episode, if any.
pub fn evaluate_tick(
    strategy_id: &str,
    current: Option<&Episode>,
    snapshot: &SnapshotInput,
    params: &StrategyParams,
    vault: &VaultBinding,
) -> TickOutcome {
    let trend = Trend::at(snapshot.ema_fast, snapshot.ema_slow);

    let Some(cur) = current else {
        let new_episode = open_episode(
            strategy_id,
            &snapshot.symbol,
            snapshot.close_time,
            snapshot.price,
            trend,
            params,
            PoolType::Standard,
            vault,
        );
        return TickOutcome::FirstOpen { new_episode };
    };

    let i_since_open = cur.last_event_bar + 1;
    let cooloff_satisfied = i_since_open >= params.cooloff_bars as i64;

    let (out_above, out_below) =
        update_breakout_streaks(snapshot.price, cur.pa, cur.pb, params.eps, cur.out_above_streak, cur.out_below_streak);

    let mut trigger: Option<CloseReason> = None;
    if cooloff_satisfied {
        if out_above >= params.breakout_confirm_bars {
            trigger = Some(CloseReason::CrossMax);
        } else if out_below >= params.breakout_confirm_bars {
            trigger = Some(CloseReason::CrossMin);
        }
    }

    if trigger.is_none() && cooloff_satisfied {
        if let Some(threshold) = params.vol_high_threshold_pct {
            if snapshot.atr_pct > threshold && cur.pool_type != PoolType::HighVol {
                trigger = Some(CloseReason::HighVol);
            }
        }
    }

    let mut atr_streak_update = None;
    if trigger.is_none() && cooloff_satisfied && cur.pa < snapshot.price && snapshot.price < cur.pb {
        let mut streaks = cur.atr_streak.clone();
        let chosen = scan_tiers(&cur.pool_type, snapshot.atr_pct, params, &mut streaks);
        if let Some(name) = chosen {
            trigger = Some(CloseReason::Tighten(name));
        }
        atr_streak_update = Some(streaks);
    }

    let streaks = StreakUpdate {
        out_above_streak: out_above,
        out_below_streak: out_below,
        last_event_bar: i_since_open,
        atr_streak: atr_streak_update,
    };

    let Some(trigger) = trigger else {
        return TickOutcome::NoTrigger(streaks);
    };

    let next_pool_type = next_pool_type_for_trigger(&trigger, params);
    let new_episode = open_episode(
        strategy_id,
        &snapshot.symbol,
        snapshot.close_time,
        snapshot.price,
        trend,
        params,
        next_pool_type,
        vault,
    );

    TickOutcome::Transition {
        close_time: snapshot.close_time,
        close_price: snapshot.price,
        close_reason: trigger,
        streaks,
        new_episode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::Tier;

    fn params_with_skew() -> StrategyParams {
        StrategyParams {
            standard_max_major_side_pct: 0.05,
            skew_low_pct: 0.075,
            skew_high_pct: 0.025,
            ..StrategyParams::default()
        }
    }

    #[test]
    fn first_open_matches_worked_example() {
        let params = params_with_skew();
        let snapshot = SnapshotInput {
            symbol: "ETHUSDT".to_string(),
            close_time: 1_000,
            price: 100.0,
            ema_fast: 11.0,
            ema_slow: 10.0,
            atr_pct: 0.004,
        };
        let outcome = evaluate_tick("strat-1", None, &snapshot, &params, &VaultBinding::default());
        let TickOutcome::FirstOpen { new_episode } = outcome else {
            panic!("expected first open");
        };
        assert_eq!(new_episode.majority_on_open, Majority::Token2);
        assert_eq!(new_episode.pool_type, PoolType::Standard);
        assert!((new_episode.pa - 98.75).abs() < 1e-9);
        assert!((new_episode.pb - 103.75).abs() < 1e-9);
        assert!(new_episode.pa < new_episode.open_price);
        assert!(new_episode.open_price < new_episode.pb);
    }

    #[test]
    fn breakout_confirms_after_required_streak_and_cooloff() {
        let mut params = params_with_skew();
        params.breakout_confirm_bars = 2;
        params.cooloff_bars = 1;
        params.tiers = vec![Tier {
            name: "tight".into(),
            atr_pct_threshold: 0.01,
            bars_required: 3,
            allowed_from: vec!["standard".into()],
            max_major_side_pct: 0.02,
        }];

        let mut episode = open_episode(
            "strat-1",
            "ETHUSDT",
            0,
            100.0,
            Trend::Up,
            &params,
            PoolType::Standard,
            &VaultBinding::default(),
        );
        episode.last_event_bar = 2; // i_since_open will be 3, past cooloff

        let snap_one = SnapshotInput {
            symbol: "ETHUSDT".into(),
            close_time: 1,
            price: episode.pb * 1.001,
            ema_fast: 11.0,
            ema_slow: 10.0,
            atr_pct: 0.004,
        };
        let TickOutcome::NoTrigger(update) =
            evaluate_tick("strat-1", Some(&episode), &snap_one, &params, &VaultBinding::default())
        else {
            panic!("single bar above band must not confirm yet");
        };
        assert_eq!(update.out_above_streak, 1);
        episode.out_above_streak = update.out_above_streak;
        episode.last_event_bar = update.last_event_bar;

        let snap_two = SnapshotInput { close_time: 2, ..snap_one };
        let outcome = evaluate_tick("strat-1", Some(&episode), &snap_two, &params, &VaultBinding::default());
        let TickOutcome::Transition { close_reason, new_episode, .. } = outcome else {
            panic!("second confirming bar must trigger cross_max");
        };
        assert_eq!(close_reason, CloseReason::CrossMax);
        assert_eq!(new_episode.pool_type, PoolType::tier("tight"));
    }

    #[test]
    fn breakout_not_emitted_before_cooloff_even_with_streak() {
        let mut params = params_with_skew();
        params.breakout_confirm_bars = 1;
        params.cooloff_bars = 5;

        let mut episode = open_episode(
            "strat-1",
            "ETHUSDT",
            0,
            100.0,
            Trend::Up,
            &params,
            PoolType::Standard,
            &VaultBinding::default(),
        );
        episode.last_event_bar = 0;

        let snap = SnapshotInput {
            symbol: "ETHUSDT".into(),
            close_time: 1,
            price: episode.pb * 2.0,
            ema_fast: 11.0,
            ema_slow: 10.0,
            atr_pct: 0.004,
        };
        let outcome = evaluate_tick("strat-1", Some(&episode), &snap, &params, &VaultBinding::default());
        assert!(matches!(outcome, TickOutcome::NoTrigger(_)));
    }

    #[test]
    fn tier_tightening_after_bars_required_consecutive_low_atr_bars() {
        let mut params = params_with_skew();
        params.tiers = vec![Tier {
            name: "tight".into(),
            atr_pct_threshold: 0.005,
            bars_required: 3,
            allowed_from: vec!["standard".into()],
            max_major_side_pct: 0.02,
        }];

        let episode = open_episode(
            "strat-1",
            "ETHUSDT",
            0,
            100.0,
            Trend::Up,
            &params,
            PoolType::Standard,
            &VaultBinding::default(),
        );
        let mut current = episode;
        current.last_event_bar = 5; // well past cooloff

        for bar in 1..3 {
            let snap = SnapshotInput {
                symbol: "ETHUSDT".into(),
                close_time: bar,
                price: 100.0,
                ema_fast: 11.0,
                ema_slow: 10.0,
                atr_pct: 0.003,
            };
            let outcome = evaluate_tick("strat-1", Some(&current), &snap, &params, &VaultBinding::default());
            let TickOutcome::NoTrigger(update) = outcome else {
                panic!("tier should not trigger before bars_required bars");
            };
            current.atr_streak = update.atr_streak.unwrap();
            current.last_event_bar = update.last_event_bar;
        }

        let snap = SnapshotInput {
            symbol: "ETHUSDT".into(),
            close_time: 3,
            price: 100.0,
            ema_fast: 11.0,
            ema_slow: 10.0,
            atr_pct: 0.003,
        };
        let outcome = evaluate_tick("strat-1", Some(&current), &snap, &params, &VaultBinding::default());
        let TickOutcome::Transition { close_reason, .. } = outcome else {
            panic!("third low-ATR bar must tighten");
        };
        assert_eq!(close_reason, CloseReason::Tighten("tight".to_string()));
    }

    #[test]
    fn ensure_valid_band_keeps_price_strictly_inside() {
        let (pa, pb) = ensure_valid_band(100.0, 100.0, 100.0);
        assert!(pa < 100.0);
        assert!(pb > 100.0);
    }
}
