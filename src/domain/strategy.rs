//! Per-symbol strategy configuration bound to an indicator set and a vault.

use crate::domain::types::{Dex, StrategyStatus};
use serde::{Deserialize, Serialize};

/// A named regime within a strategy, selected by an ATR% threshold and a
/// confirmation length once the episode is already inside its current band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub atr_pct_threshold: f64,
    pub bars_required: u32,
    pub allowed_from: Vec<String>,
    pub max_major_side_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub eps: f64,
    pub cooloff_bars: u32,
    pub breakout_confirm_bars: u32,
    pub vol_high_threshold_pct: Option<f64>,
    pub tiers: Vec<Tier>,
    pub skew_low_pct: f64,
    pub skew_high_pct: f64,
    pub standard_max_major_side_pct: f64,
    pub high_vol_max_major_side_pct: f64,
    /// Reserved: present for a future "preserve proportions on resize" mode.
    pub inrange_resize_mode: String,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            cooloff_bars: 1,
            breakout_confirm_bars: 1,
            vol_high_threshold_pct: None,
            tiers: Vec::new(),
            skew_low_pct: 0.075,
            skew_high_pct: 0.025,
            standard_max_major_side_pct: 0.05,
            high_vol_max_major_side_pct: 0.10,
            inrange_resize_mode: "skew_swap".to_string(),
        }
    }
}

impl StrategyParams {
    /// Tiers sorted ascending by `atr_pct_threshold`, as consumed by the
    /// tier-tightening scan and the narrowest-tier lookup on a breakout.
    pub fn tiers_ascending(&self) -> Vec<&Tier> {
        let mut tiers: Vec<&Tier> = self.tiers.iter().collect();
        tiers.sort_by(|a, b| a.atr_pct_threshold.partial_cmp(&b.atr_pct_threshold).unwrap());
        tiers
    }

    /// The narrowest configured tier (last once sorted ascending by threshold).
    pub fn narrowest_tier(&self) -> Option<&Tier> {
        self.tiers_ascending().into_iter().next_back()
    }

    pub fn find_tier(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.name == name)
    }
}

/// On-chain vault binding plus the band-sizing parameters a strategy applies
/// to every episode it opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub status: StrategyStatus,
    pub indicator_set_cfg_hash: String,
    pub params: StrategyParams,
    pub dex: Option<Dex>,
    pub alias: Option<String>,
    pub token0_address: Option<String>,
    pub token1_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(name: &str, thr: f64) -> Tier {
        Tier {
            name: name.to_string(),
            atr_pct_threshold: thr,
            bars_required: 3,
            allowed_from: vec!["standard".to_string()],
            max_major_side_pct: 0.02,
        }
    }

    #[test]
    fn narrowest_tier_is_the_one_with_highest_threshold() {
        let mut params = StrategyParams::default();
        params.tiers = vec![tier("loose", 0.01), tier("tight", 0.05), tier("mid", 0.03)];
        assert_eq!(params.narrowest_tier().unwrap().name, "tight");
    }

    #[test]
    fn tiers_ascending_orders_by_threshold() {
        let mut params = StrategyParams::default();
        params.tiers = vec![tier("b", 0.05), tier("a", 0.01)];
        let ordered = params.tiers_ascending();
        assert_eq!(ordered[0].name, "a");
        assert_eq!(ordered[1].name, "b");
    }
}
