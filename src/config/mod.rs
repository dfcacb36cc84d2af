//! Configuration (layered: process env > `config/.<APP_ENV>.env` > `.env`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;

use crate::auth::manager::DEFAULT_REFRESH_TIMEOUT;
use crate::auth::{ClientCredentials, ManagerOptions, TokenStoreConfig};
use crate::error::{CrmError, Result};

pub const ENV_CLIENT_ID: &str = "CRM_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CRM_CLIENT_SECRET";
pub const ENV_API_BASE_URL: &str = "CRM_API_BASE_URL";
pub const ENV_ENVIRONMENT: &str = "APP_ENV";
pub const ENV_REDIRECT_URI: &str = "CRM_REDIRECT_URI";
pub const ENV_TOKEN_PATH: &str = "CRM_TOKEN_PATH";
pub const ENV_REFRESH_TIMEOUT_SECS: &str = "CRM_REFRESH_TIMEOUT_SECS";

/// Environment name used when `APP_ENV` is unset.
pub const DEFAULT_ENVIRONMENT: &str = "local";

/// Everything needed to talk to one CRM account.
#[derive(Clone, Builder)]
pub struct CrmConfig {
    #[builder(into)]
    pub client_id: String,
    #[builder(into)]
    pub client_secret: String,
    /// Account base URL, e.g. `https://example.amocrm.ru`.
    #[builder(into)]
    pub api_base_url: String,
    #[builder(into, default = DEFAULT_ENVIRONMENT.to_string())]
    pub environment: String,
    /// Only needed for the authorization-code bootstrap.
    #[builder(into)]
    pub redirect_uri: Option<String>,
    #[builder(default = TokenStoreConfig::default_path())]
    pub token_path: PathBuf,
    #[builder(default = DEFAULT_REFRESH_TIMEOUT)]
    pub refresh_timeout: Duration,
}

impl fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .field("api_base_url", &self.api_base_url)
            .field("environment", &self.environment)
            .field("redirect_uri", &self.redirect_uri)
            .field("token_path", &self.token_path)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish()
    }
}

impl CrmConfig {
    /// Load env files for the current `APP_ENV`, then read the process environment.
    pub fn from_env() -> Result<Self> {
        let environment =
            std::env::var(ENV_ENVIRONMENT).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());
        load_env_files(Path::new("."), &environment);
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                CrmError::Configuration(format!("missing required environment variable {key}"))
            })
        };

        let refresh_timeout = match get(ENV_REFRESH_TIMEOUT_SECS) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(CrmError::Configuration(format!(
                        "{ENV_REFRESH_TIMEOUT_SECS} must be a positive integer, got '{raw}'"
                    )))
                }
            },
            None => DEFAULT_REFRESH_TIMEOUT,
        };

        let config = Self::builder()
            .client_id(require(ENV_CLIENT_ID)?)
            .client_secret(require(ENV_CLIENT_SECRET)?)
            .api_base_url(require(ENV_API_BASE_URL)?)
            .environment(get(ENV_ENVIRONMENT).unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()))
            .maybe_redirect_uri(get(ENV_REDIRECT_URI))
            .token_path(
                get(ENV_TOKEN_PATH)
                    .map(PathBuf::from)
                    .unwrap_or_else(TokenStoreConfig::default_path),
            )
            .refresh_timeout(refresh_timeout)
            .build();
        tracing::debug!(config = ?config, "configuration loaded");
        Ok(config)
    }

    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    pub fn token_store_config(&self) -> TokenStoreConfig {
        TokenStoreConfig::new(self.token_path.clone())
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions::builder()
            .refresh_timeout(self.refresh_timeout)
            .build()
    }

    /// Redirect URI for the bootstrap, preferring an explicit override.
    pub fn redirect_uri_or(&self, explicit: Option<String>) -> Result<String> {
        explicit.or_else(|| self.redirect_uri.clone()).ok_or_else(|| {
            CrmError::Configuration(format!(
                "no redirect URI: pass --redirect-uri or set {ENV_REDIRECT_URI}"
            ))
        })
    }
}

/// Load `config/.<environment>.env` then `.env` under `root`, without
/// overriding variables that are already set. Returns the files loaded.
pub fn load_env_files(root: &Path, environment: &str) -> Vec<PathBuf> {
    let candidates = [
        root.join("config").join(format!(".{environment}.env")),
        root.join(".env"),
    ];
    let mut loaded = Vec::new();
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match dotenvy::from_path(&path) {
            Ok(()) => loaded.push(path),
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to load env file"),
        }
    }
    loaded
}
