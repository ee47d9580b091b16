//! Outbound ports the application layer drives and the infrastructure layer
//! implements: the on-chain vault facade.

use crate::domain::errors::VaultError;
use crate::domain::types::{Dex, WithdrawMode};
use async_trait::async_trait;

/// Live state of a vault's position, as needed to size a swap step and to
/// check whether a band is already aligned with a desired one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VaultStatus {
    /// Token0 held by the vault, in token0 units.
    pub amt0: f64,
    /// Token1 held by the vault, in token1 units.
    pub amt1: f64,
    /// Current price of token0 denominated in token1, i.e. `token1 per token0`.
    pub p_t1_t0: f64,
    pub current_lower_price: f64,
    pub current_upper_price: f64,
}

/// Outcome of a mutating vault call. `ok` reflects the facade's own
/// success/failure field, independent of HTTP transport success.
#[derive(Debug, Clone)]
pub struct VaultActionResult {
    pub ok: bool,
    pub raw: serde_json::Value,
}

/// The on-chain vault's HTTP surface, as consumed by the execution pipeline
/// and the reconciler.
#[async_trait]
pub trait VaultClient: Send + Sync {
    async fn status(&self, dex: Dex, alias: &str) -> Result<VaultStatus, VaultError>;

    async fn collect(&self, dex: Dex, alias: &str) -> Result<VaultActionResult, VaultError>;

    async fn withdraw(&self, dex: Dex, alias: &str, mode: WithdrawMode) -> Result<VaultActionResult, VaultError>;

    async fn swap_exact_in(
        &self,
        dex: Dex,
        alias: &str,
        token_in: &str,
        token_out: &str,
        amount_in_usd: f64,
    ) -> Result<VaultActionResult, VaultError>;

    async fn rebalance(
        &self,
        dex: Dex,
        alias: &str,
        lower_price: f64,
        upper_price: f64,
    ) -> Result<VaultActionResult, VaultError>;
}
