//! HTTP facade over the on-chain vault service. Two clients are kept
//! deliberately separate: status polls are cheap and should fail fast,
//! while mutating actions (withdraw/swap/rebalance) can take a full block
//! or more to land and need a much longer budget.

use crate::domain::errors::VaultError;
use crate::domain::ports::{VaultActionResult, VaultClient, VaultStatus};
use crate::domain::types::{Dex, WithdrawMode};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpVaultClient {
    base_url: String,
    status_client: Client,
    action_client: Client,
}

impl HttpVaultClient {
    pub fn new(base_url: String, status_timeout: Duration, action_timeout: Duration) -> Self {
        let status_client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(status_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        let action_client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(action_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url,
            status_client,
            action_client,
        }
    }

    fn endpoint(&self, dex: Dex, alias: &str, action: &str) -> String {
        format!("{}/vaults/{}/{}/{}", self.base_url, dex, alias, action)
    }

    async fn post_action(&self, dex: Dex, alias: &str, action: &str, body: serde_json::Value) -> Result<VaultActionResult, VaultError> {
        let url = self.endpoint(dex, alias, action);
        debug!(%url, "posting vault action");

        let response = self
            .action_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VaultError::Http(e.to_string()))?;

        let status = response.status();
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VaultError::Http(format!("failed to decode response: {e}")))?;

        if !status.is_success() {
            warn!(%action, %status, "vault action returned non-success status");
            return Err(VaultError::ActionFailed {
                action: action.to_string(),
                detail: raw.to_string(),
            });
        }

        let ok = raw
            .get("ok")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        if !ok {
            return Err(VaultError::ActionFailed {
                action: action.to_string(),
                detail: raw.to_string(),
            });
        }

        Ok(VaultActionResult { ok, raw })
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    amt0: f64,
    amt1: f64,
    p_t1_t0: f64,
    current_lower_price: f64,
    current_upper_price: f64,
}

#[async_trait]
impl VaultClient for HttpVaultClient {
    async fn status(&self, dex: Dex, alias: &str) -> Result<VaultStatus, VaultError> {
        let url = self.endpoint(dex, alias, "status");

        let response = self
            .status_client
            .get(&url)
            .send()
            .await
            .map_err(|e| VaultError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VaultError::Http(format!("status endpoint returned {}", response.status())));
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Http(format!("failed to decode status response: {e}")))?;

        Ok(VaultStatus {
            amt0: parsed.amt0,
            amt1: parsed.amt1,
            p_t1_t0: parsed.p_t1_t0,
            current_lower_price: parsed.current_lower_price,
            current_upper_price: parsed.current_upper_price,
        })
    }

    async fn collect(&self, dex: Dex, alias: &str) -> Result<VaultActionResult, VaultError> {
        self.post_action(dex, alias, "collect", json!({})).await
    }

    async fn withdraw(&self, dex: Dex, alias: &str, mode: WithdrawMode) -> Result<VaultActionResult, VaultError> {
        self.post_action(dex, alias, "withdraw", json!({ "mode": mode.to_string() })).await
    }

    async fn swap_exact_in(
        &self,
        dex: Dex,
        alias: &str,
        token_in: &str,
        token_out: &str,
        amount_in_usd: f64,
    ) -> Result<VaultActionResult, VaultError> {
        self.post_action(
            dex,
            alias,
            "swap_exact_in",
            json!({
                "token_in": token_in,
                "token_out": token_out,
                "amount_in_usd": amount_in_usd,
            }),
        )
        .await
    }

    async fn rebalance(
        &self,
        dex: Dex,
        alias: &str,
        lower_price: f64,
        upper_price: f64,
    ) -> Result<VaultActionResult, VaultError> {
        self.post_action(
            dex,
            alias,
            "rebalance",
            json!({
                "lower_price": lower_price,
                "upper_price": upper_price,
            }),
        )
        .await
    }
}
