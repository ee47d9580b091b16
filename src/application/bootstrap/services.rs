use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::ports::VaultClient;
use crate::infrastructure::vault_http::HttpVaultClient;

pub struct ServicesHandle {
    pub vault: Arc<dyn VaultClient>,
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    pub async fn init(config: &Config) -> Result<ServicesHandle> {
        let vault = Arc::new(HttpVaultClient::new(
            config.vault_base_url.clone(),
            config.vault_status_timeout,
            config.vault_action_timeout,
        ));

        Ok(ServicesHandle { vault })
    }
}
