//! Durable execution plans and their ordered steps.

use crate::domain::episode::Episode;
use crate::domain::types::{Dex, WithdrawMode};
use serde::{Deserialize, Serialize};

/// One step of a plan. Amounts and caps are never stored here: they are
/// resolved from live vault state immediately before the step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Collect {
        dex: Dex,
        alias: String,
    },
    Withdraw {
        dex: Dex,
        alias: String,
        mode: WithdrawMode,
    },
    SwapExactIn {
        dex: Dex,
        alias: String,
    },
    Rebalance {
        dex: Dex,
        alias: String,
        lower_price: f64,
        upper_price: f64,
    },
    NoopLegacy {
        reason: String,
        lower_price: f64,
        upper_price: f64,
    },
}

impl Step {
    pub fn action_name(&self) -> &'static str {
        match self {
            Step::Collect { .. } => "COLLECT",
            Step::Withdraw { .. } => "WITHDRAW",
            Step::SwapExactIn { .. } => "SWAP_EXACT_IN",
            Step::Rebalance { .. } => "REBALANCE",
            Step::NoopLegacy { .. } => "NOOP_LEGACY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    OpenNewRange,
    RebalanceToRange,
    FullMaintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Pending,
    Executed,
    Failed,
}

/// A durable, ordered plan to transition on-chain state toward a desired
/// episode. Keyed by `(strategy_id, ts, signal_type)`; re-emission upserts
/// in place rather than creating a duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: String,
    pub ts: i64,
    pub signal_type: SignalType,
    pub status: SignalStatus,
    pub attempts: u32,
    pub cfg_hash: String,
    pub symbol: String,
    pub steps: Vec<Step>,
    /// Snapshot of the episode that produced this plan, embedded rather than
    /// referenced by id so edits to the strategy's live episode can't alter
    /// a plan already queued for execution.
    pub episode: Episode,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Output of the reconciler: either nothing to do, or a new plan to upsert.
pub struct ReconcilePlan {
    pub signal_type: SignalType,
    pub steps: Vec<Step>,
}
