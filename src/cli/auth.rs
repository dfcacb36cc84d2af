//! CLI auth command handlers for bootstrap, status, and logout.

use crate::auth::{CredentialState, FileTokenStore, StoreError, TokenStore};
use crate::config::CrmConfig;
use crate::error::Result;

use super::{BootstrapArgs, Services};

/// Handle `crmsync auth bootstrap --code <CODE>`.
pub async fn handle_bootstrap(config: &CrmConfig, args: BootstrapArgs) -> Result<()> {
    let redirect_uri = config.redirect_uri_or(args.redirect_uri)?;
    let services = Services::connect(config)?;
    services.manager.bootstrap(&args.code, &redirect_uri).await?;
    println!("Credential stored at {}", services.store_path.display());
    Ok(())
}

/// Handle `crmsync auth status`.
///
/// Validates the stored credential with one refresh, which also rotates it.
pub async fn handle_status(config: &CrmConfig) -> Result<()> {
    let store = FileTokenStore::new(config.token_store_config());
    match store.load() {
        Ok(_) => println!("Stored credential: {}", store.path().display()),
        Err(StoreError::NotFound(_)) => {
            println!("No stored credential; run `crmsync auth bootstrap --code <CODE>`");
            return Ok(());
        }
        Err(err) => {
            println!("Stored credential unusable: {err}");
            return Ok(());
        }
    }

    let services = Services::connect(config)?;
    if let Err(err) = services.manager.initialize().await {
        tracing::warn!(error = %err, "credential validation failed");
    }
    let status = services.manager.status();
    println!("State: {}", status.state);
    if let Some(left) = status.cached_for {
        println!("Access token valid for {}s", left.as_secs());
    }
    if status.state == CredentialState::Failed {
        println!("Re-run `crmsync auth bootstrap --code <CODE>` to restore access");
    }
    Ok(())
}

/// Handle `crmsync auth logout`.
pub fn handle_logout(config: &CrmConfig) -> Result<()> {
    let services = Services::connect(config)?;
    services.manager.logout()?;
    println!("Removed {}", services.store_path.display());
    Ok(())
}
