//! Wiring of the credential manager and contacts client from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{CredentialManager, FileTokenStore, TokenEndpoint};
use crate::config::CrmConfig;
use crate::crm::{ApiHttp, CrmClient};
use crate::error::Result;

/// Credential manager and contacts client wired from configuration.
pub struct Services {
    pub manager: CredentialManager,
    pub client: CrmClient,
    pub store_path: PathBuf,
}

impl Services {
    pub fn connect(config: &CrmConfig) -> Result<Self> {
        let http = ApiHttp::new(config.api_base_url.clone())?;
        let endpoint = TokenEndpoint::new(http.clone(), config.credentials());
        let store = FileTokenStore::new(config.token_store_config());
        let store_path = store.path().to_path_buf();
        let manager = CredentialManager::new(
            Arc::new(endpoint),
            Arc::new(store),
            config.manager_options(),
        );
        let client = CrmClient::new(http, Arc::new(manager.clone()));
        Ok(Self {
            manager,
            client,
            store_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialState;

    #[test]
    fn services_connect_uses_configured_token_path() {
        let config = CrmConfig::builder()
            .client_id("id")
            .client_secret("secret")
            .api_base_url("https://example.amocrm.ru")
            .token_path("/tmp/crmsync-test/token.json".into())
            .build();
        let services = Services::connect(&config).unwrap();
        assert_eq!(
            services.store_path,
            PathBuf::from("/tmp/crmsync-test/token.json")
        );
        assert_eq!(
            services.manager.state(),
            CredentialState::Uninitialized
        );
    }
}
