//! Tagged sum types shared across the signal core and the execution pipeline.
//!
//! Modeled as Rust enums rather than loose string fields so illegal states
//! (an unknown dex, a typo'd close reason) are caught at construction instead
//! of surfacing as a runtime string mismatch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dex {
    Uniswap,
    Aerodrome,
    Pancake,
}

impl fmt::Display for Dex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dex::Uniswap => write!(f, "uniswap"),
            Dex::Aerodrome => write!(f, "aerodrome"),
            Dex::Pancake => write!(f, "pancake"),
        }
    }
}

impl FromStr for Dex {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniswap" => Ok(Dex::Uniswap),
            "aerodrome" => Ok(Dex::Aerodrome),
            "pancake" => Ok(Dex::Pancake),
            other => anyhow::bail!("unknown dex: {other}"),
        }
    }
}

/// Trend of the underlying price at the bar an episode opened or re-opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
}

impl Trend {
    pub fn at(ema_fast: f64, ema_slow: f64) -> Self {
        if ema_fast > ema_slow { Trend::Up } else { Trend::Down }
    }

    /// `mode_on_open` string form: `trend_up` / `trend_down`.
    pub fn mode_str(&self) -> &'static str {
        match self {
            Trend::Up => "trend_up",
            Trend::Down => "trend_down",
        }
    }
}

/// Which token is expected to carry the larger share of value in the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Majority {
    Token1,
    Token2,
}

impl Majority {
    /// Majority tracks trend: down opens with token1 major, up with token2.
    pub fn for_trend(trend: Trend) -> Self {
        match trend {
            Trend::Down => Majority::Token1,
            Trend::Up => Majority::Token2,
        }
    }
}

/// Regime an episode's band was sized for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    Standard,
    HighVol,
    Tier(String),
}

impl PoolType {
    /// The key used to compare against a tier's `name` / `allowed_from` list.
    pub fn key(&self) -> &str {
        match self {
            PoolType::Standard => "standard",
            PoolType::HighVol => "high_vol",
            PoolType::Tier(name) => name.as_str(),
        }
    }

    pub fn tier(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            "standard" => PoolType::Standard,
            "high_vol" => PoolType::HighVol,
            _ => PoolType::Tier(name),
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Why an episode closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    CrossMax,
    CrossMin,
    HighVol,
    Tighten(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::CrossMax => write!(f, "cross_max"),
            CloseReason::CrossMin => write!(f, "cross_min"),
            CloseReason::HighVol => write!(f, "high_vol"),
            CloseReason::Tighten(name) => write!(f, "tighten_{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndicatorSetStatus {
    Active,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EpisodeStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawMode {
    Pool,
    All,
}

impl fmt::Display for WithdrawMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WithdrawMode::Pool => write!(f, "pool"),
            WithdrawMode::All => write!(f, "all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_follows_ema_cross() {
        assert_eq!(Trend::at(1.1, 1.0), Trend::Up);
        assert_eq!(Trend::at(1.0, 1.1), Trend::Down);
        assert_eq!(Trend::at(1.0, 1.0), Trend::Down);
    }

    #[test]
    fn majority_tracks_trend() {
        assert_eq!(Majority::for_trend(Trend::Up), Majority::Token2);
        assert_eq!(Majority::for_trend(Trend::Down), Majority::Token1);
    }

    #[test]
    fn pool_type_key_round_trips() {
        assert_eq!(PoolType::tier("standard").key(), "standard");
        assert_eq!(PoolType::tier("high_vol").key(), "high_vol");
        assert_eq!(PoolType::tier("tight").key(), "tight");
    }

    #[test]
    fn dex_from_str_rejects_unknown() {
        assert!(Dex::from_str("uniswap").is_ok());
        assert!(Dex::from_str("sushiswap").is_err());
    }
}
