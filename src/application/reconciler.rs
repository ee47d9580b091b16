//! Reconciler: compares a desired episode against the vault's live band and
//! produces an ordered execution plan. The steps array is strictly ordered;
//! the pipeline executes it front to back. Canonical rotation order is
//! COLLECT, WITHDRAW, SWAP_EXACT_IN, REBALANCE.

use crate::domain::episode::Episode;
use crate::domain::errors::{ReconcileError, VaultError};
use crate::domain::ports::VaultClient;
use crate::domain::signal::{ReconcilePlan, SignalType, Step};
use crate::domain::types::WithdrawMode;

const ALIGNMENT_TOLERANCE: f64 = 1e-9;

/// Builds the plan to bring the vault's live band in line with `desired`.
/// Returns `None` when the vault is already aligned: nothing to do.
pub async fn reconcile<V: VaultClient + ?Sized>(
    vault: &V,
    desired: &Episode,
) -> Result<Option<ReconcilePlan>, ReconcileError> {
    let (dex, alias) = match (desired.dex, desired.alias.as_deref()) {
        (Some(dex), Some(alias)) => (dex, alias),
        _ => {
            return Ok(Some(ReconcilePlan {
                signal_type: SignalType::OpenNewRange,
                steps: vec![Step::NoopLegacy {
                    reason: "FIRST_OPEN_NO_VAULT".to_string(),
                    lower_price: desired.pa,
                    upper_price: desired.pb,
                }],
            }));
        }
    };

    let status = match vault.status(dex, alias).await {
        Ok(status) => Some(status),
        Err(VaultError::ActionFailed { .. }) => None,
        Err(e) => return Err(ReconcileError::Vault(e)),
    };

    let status = match status {
        None => {
            return Ok(Some(ReconcilePlan {
                signal_type: SignalType::OpenNewRange,
                steps: vec![Step::Rebalance {
                    dex,
                    alias: alias.to_string(),
                    lower_price: desired.pa,
                    upper_price: desired.pb,
                }],
            }));
        }
        Some(status) => status,
    };

    let aligned = (status.current_lower_price - desired.pa).abs() <= ALIGNMENT_TOLERANCE
        && (status.current_upper_price - desired.pb).abs() <= ALIGNMENT_TOLERANCE;

    if aligned {
        return Ok(None);
    }

    Ok(Some(ReconcilePlan {
        signal_type: SignalType::RebalanceToRange,
        steps: vec![
            Step::Collect { dex, alias: alias.to_string() },
            Step::Withdraw { dex, alias: alias.to_string(), mode: WithdrawMode::Pool },
            Step::SwapExactIn { dex, alias: alias.to_string() },
            Step::Rebalance {
                dex,
                alias: alias.to_string(),
                lower_price: desired.pa,
                upper_price: desired.pb,
            },
        ],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::episode::Episode;
    use crate::domain::ports::{VaultActionResult, VaultStatus};
    use crate::domain::types::{Dex, EpisodeStatus, Majority, PoolType, Trend};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubVault {
        status: Option<VaultStatus>,
    }

    #[async_trait]
    impl VaultClient for StubVault {
        async fn status(&self, _dex: Dex, _alias: &str) -> Result<VaultStatus, VaultError> {
            self.status.clone().ok_or_else(|| VaultError::ActionFailed {
                action: "status".to_string(),
                detail: "no position".to_string(),
            })
        }
        async fn collect(&self, _dex: Dex, _alias: &str) -> Result<VaultActionResult, VaultError> {
            unimplemented!()
        }
        async fn withdraw(&self, _dex: Dex, _alias: &str, _mode: WithdrawMode) -> Result<VaultActionResult, VaultError> {
            unimplemented!()
        }
        async fn swap_exact_in(&self, _dex: Dex, _alias: &str, _tin: &str, _tout: &str, _amt: f64) -> Result<VaultActionResult, VaultError> {
            unimplemented!()
        }
        async fn rebalance(&self, _dex: Dex, _alias: &str, _lower: f64, _upper: f64) -> Result<VaultActionResult, VaultError> {
            unimplemented!()
        }
    }

    fn episode(pa: f64, pb: f64) -> Episode {
        Episode {
            strategy_id: "s1".to_string(),
            symbol: "ETHUSDT".to_string(),
            status: EpisodeStatus::Open,
            open_time: 0,
            open_price: 2000.0,
            pa,
            pb,
            pool_type: PoolType::Standard,
            mode_on_open: Trend::Up,
            majority_on_open: Majority::Token2,
            target_major_pct: 0.5,
            target_minor_pct: 0.5,
            last_event_bar: 0,
            out_above_streak: 0,
            out_below_streak: 0,
            atr_streak: HashMap::new(),
            close_time: None,
            close_price: None,
            close_reason: None,
            dex: Some(Dex::Uniswap),
            alias: Some("alias1".to_string()),
            token0_address: Some("0xaaa".to_string()),
            token1_address: Some("0xbbb".to_string()),
        }
    }

    #[tokio::test]
    async fn first_open_rebalances_directly() {
        let vault = StubVault { status: None };
        let plan = reconcile(&vault, &episode(1900.0, 2100.0)).await.unwrap().unwrap();
        assert_eq!(plan.signal_type, SignalType::OpenNewRange);
        assert_eq!(plan.steps.len(), 1);
        assert!(matches!(plan.steps[0], Step::Rebalance { .. }));
    }

    #[tokio::test]
    async fn aligned_band_produces_no_plan() {
        let vault = StubVault {
            status: Some(VaultStatus {
                amt0: 1.0,
                amt1: 1.0,
                p_t1_t0: 2000.0,
                current_lower_price: 1900.0,
                current_upper_price: 2100.0,
            }),
        };
        let plan = reconcile(&vault, &episode(1900.0, 2100.0)).await.unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn misaligned_band_produces_full_rotation() {
        let vault = StubVault {
            status: Some(VaultStatus {
                amt0: 1.0,
                amt1: 1.0,
                p_t1_t0: 2000.0,
                current_lower_price: 1800.0,
                current_upper_price: 2000.0,
            }),
        };
        let plan = reconcile(&vault, &episode(1900.0, 2100.0)).await.unwrap().unwrap();
        assert_eq!(plan.signal_type, SignalType::RebalanceToRange);
        assert_eq!(plan.steps.len(), 4);
        assert_eq!(plan.steps[0].action_name(), "COLLECT");
        assert_eq!(plan.steps[3].action_name(), "REBALANCE");
    }
}
