//! EMA/ATR% indicator computation over closed candles.
//!
//! Mirrors the warm-up semantics of a pandas `ewm(adjust=False, min_periods=...)`
//! series: the recursive EMA is always carried forward from the first
//! observation, but the value is only considered defined once at least
//! `max(2, span/2)` observations have been seen.

use crate::domain::candle::Candle;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Dedup key for `(symbol, ema_fast, ema_slow, atr_window)` plus its derived hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: String,
    pub ema_fast: u32,
    pub ema_slow: u32,
    pub atr_window: u32,
    pub cfg_hash: String,
    pub status: crate::domain::types::IndicatorSetStatus,
}

impl IndicatorSet {
    /// First 16 hex chars of the SHA-1 digest of `"{symbol}|{ema_fast}|{ema_slow}|{atr_window}"`.
    pub fn compute_cfg_hash(symbol: &str, ema_fast: u32, ema_slow: u32, atr_window: u32) -> String {
        use sha1::{Digest, Sha1};
        let cfg_str = format!("{symbol}|{ema_fast}|{ema_slow}|{atr_window}");
        let digest = Sha1::digest(cfg_str.as_bytes());
        hex_prefix(&digest, 16)
    }

    pub fn required_bars(&self) -> usize {
        self.ema_slow.max(self.atr_window) as usize
    }

    pub fn new(symbol: impl Into<String>, ema_fast: u32, ema_slow: u32, atr_window: u32) -> Self {
        let symbol = symbol.into();
        let cfg_hash = Self::compute_cfg_hash(&symbol, ema_fast, ema_slow, atr_window);
        Self {
            symbol,
            ema_fast,
            ema_slow,
            atr_window,
            cfg_hash,
            status: crate::domain::types::IndicatorSetStatus::Active,
        }
    }
}

fn hex_prefix(bytes: &[u8], hex_chars: usize) -> String {
    let mut s = String::with_capacity(hex_chars);
    for b in bytes {
        if s.len() >= hex_chars {
            break;
        }
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(hex_chars);
    s
}

/// One snapshot per `(symbol, close_time, indicator_set)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub close_time: i64,
    pub cfg_hash: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub atr_pct: f64,
}

/// Forward-fill non-finite values with the last finite value seen.
fn ffill(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = last;
        } else {
            last = *v;
        }
    }
}

/// Incremental EMA accumulator implementing the same warm-up rule as [`ema_series`].
#[derive(Debug, Clone, Copy)]
pub struct EmaState {
    alpha: f64,
    min_periods: usize,
    seen: usize,
    value: f64,
}

impl EmaState {
    pub fn new(span: usize) -> Self {
        Self {
            alpha: 2.0 / (span as f64 + 1.0),
            min_periods: span.div_euclid(2).max(2),
            seen: 0,
            value: 0.0,
        }
    }

    /// Feed one observation; returns `Some(ema)` once warm-up is satisfied.
    pub fn update(&mut self, x: f64) -> Option<f64> {
        self.value = if self.seen == 0 {
            x
        } else {
            self.alpha * x + (1.0 - self.alpha) * self.value
        };
        self.seen += 1;
        if self.seen >= self.min_periods {
            Some(self.value)
        } else {
            None
        }
    }
}

/// Full EMA series over `values`, `None` before warm-up, matching pandas
/// `ewm(span=s, adjust=False, min_periods=max(2, s//2))`.
pub fn ema_series(values: &[f64], span: usize) -> Vec<Option<f64>> {
    let mut state = EmaState::new(span);
    values.iter().map(|&x| state.update(x)).collect()
}

/// True Range series. First bar has no prior close, so `TR_1 = high_1 - low_1`.
fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(highs.len());
    for i in 0..highs.len() {
        if i == 0 {
            tr.push(highs[i] - lows[i]);
        } else {
            let prev_close = closes[i - 1];
            tr.push(
                (highs[i] - lows[i])
                    .abs()
                    .max((highs[i] - prev_close).abs())
                    .max((lows[i] - prev_close).abs()),
            );
        }
    }
    tr
}

/// ATR% = smoothed(TR) / close, forward-filled through warm-up gaps, terminal NaN -> 0.
pub fn atr_pct_series(highs: &[f64], lows: &[f64], closes: &[f64], window: usize) -> Vec<f64> {
    let tr = true_range(highs, lows, closes);
    let atr = ema_series(&tr, window);
    let mut out: Vec<f64> = atr
        .iter()
        .zip(closes.iter())
        .map(|(a, c)| match a {
            Some(a) if *c != 0.0 => a / c,
            _ => f64::NAN,
        })
        .collect();
    ffill(&mut out);
    for v in out.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    out
}

fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(f64::NAN)
}

use rust_decimal::Decimal;

/// Compute a snapshot for the last candle in `candles` (ascending by close_time).
///
/// Returns `None` if fewer than `max(ema_slow, atr_window)` candles are given.
pub fn compute_snapshot(
    candles: &[Candle],
    ema_fast: u32,
    ema_slow: u32,
    atr_window: u32,
    cfg_hash: &str,
) -> Option<IndicatorSnapshot> {
    let required = (ema_slow.max(atr_window)) as usize;
    if candles.len() < required {
        return None;
    }

    let mut closes: Vec<f64> = candles.iter().map(|c| decimal_to_f64(c.close)).collect();
    ffill(&mut closes);
    let highs: Vec<f64> = candles.iter().map(|c| decimal_to_f64(c.high)).collect();
    let lows: Vec<f64> = candles.iter().map(|c| decimal_to_f64(c.low)).collect();

    let ema_fast_series = ema_series(&closes, ema_fast as usize);
    let ema_slow_series = ema_series(&closes, ema_slow as usize);
    let atr_pct = atr_pct_series(&highs, &lows, &closes, atr_window as usize);

    let last = candles.last()?;
    Some(IndicatorSnapshot {
        symbol: last.symbol.clone(),
        close_time: last.close_time,
        cfg_hash: cfg_hash.to_string(),
        open: decimal_to_f64(last.open),
        high: decimal_to_f64(last.high),
        low: decimal_to_f64(last.low),
        close: decimal_to_f64(last.close),
        ema_fast: ema_fast_series.last().copied().flatten().unwrap_or(0.0),
        ema_slow: ema_slow_series.last().copied().flatten().unwrap_or(0.0),
        atr_pct: *atr_pct.last().unwrap_or(&0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close_time: i64, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle {
            symbol: "ETHUSDT".into(),
            interval: "1m".into(),
            open_time: close_time - 60_000,
            close_time,
            open: Decimal::try_from(o).unwrap(),
            high: Decimal::try_from(h).unwrap(),
            low: Decimal::try_from(l).unwrap(),
            close: Decimal::try_from(c).unwrap(),
            volume: dec!(1),
            trades: 1,
        }
    }

    #[test]
    fn cfg_hash_is_stable_16_hex() {
        let h1 = IndicatorSet::compute_cfg_hash("ETHUSDT", 5, 20, 14);
        let h2 = IndicatorSet::compute_cfg_hash("ETHUSDT", 5, 20, 14);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
        assert_ne!(h1, IndicatorSet::compute_cfg_hash("ETHUSDT", 5, 21, 14));
    }

    #[test]
    fn ema_series_warms_up_then_tracks_constant_input() {
        let values = vec![100.0; 10];
        let series = ema_series(&values, 4);
        assert!(series[0].is_none());
        let last = series.last().unwrap().unwrap();
        assert!((last - 100.0).abs() < 1e-9);
    }

    #[test]
    fn no_snapshot_before_required_bars() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| candle(i * 60_000, 100.0, 101.0, 99.0, 100.0))
            .collect();
        assert!(compute_snapshot(&candles, 5, 20, 14, "hash").is_none());
    }

    #[test]
    fn snapshot_produced_once_enough_bars_observed() {
        let mut candles = Vec::new();
        for i in 0..25 {
            let c = 100.0 + (i as f64) * 0.1;
            candles.push(candle(i * 60_000, c, c + 0.5, c - 0.5, c));
        }
        let snap = compute_snapshot(&candles, 5, 20, 14, "hash").unwrap();
        assert_eq!(snap.close_time, 24 * 60_000);
        assert!(snap.ema_fast > snap.ema_slow);
        assert!(snap.atr_pct > 0.0);
    }

    #[test]
    fn true_range_first_bar_has_no_prior_close() {
        let tr = true_range(&[105.0], &[95.0], &[100.0]);
        assert_eq!(tr, vec![10.0]);
    }

    #[test]
    fn atr_pct_terminal_nan_becomes_zero() {
        let out = atr_pct_series(&[1.0], &[1.0], &[0.0], 14);
        assert_eq!(out, vec![0.0]);
    }
}
