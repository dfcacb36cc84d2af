use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use super::token::TokenPair;

const TOKEN_FILE_VERSION: u32 = 1;

/// Durable single-record storage for the latest token pair.
///
/// Implementations do not retry; failures propagate to the caller.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<TokenPair, StoreError>;
    fn save(&self, token: &TokenPair) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Configuration for file-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub path: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "crmsync")
            .map(|dirs| dirs.data_dir().join("token.json"))
            .unwrap_or_else(|| PathBuf::from("token.json"))
    }
}

/// File-backed token store writing one JSON document.
///
/// Writes go to a temporary sibling that is synced and renamed over the
/// target, so a crash never leaves a half-written credential behind.
///
/// # Example
/// ```no_run
/// use crmsync::auth::{FileTokenStore, TokenPair, TokenStore, TokenStoreConfig};
///
/// let store = FileTokenStore::new(TokenStoreConfig::new("token.json".into()));
/// let pair = TokenPair {
///     token_type: "Bearer".to_string(),
///     access_token: "access".to_string(),
///     refresh_token: "refresh".to_string(),
///     expires_in: 86_400,
/// };
/// store.save(&pair)?;
/// # Ok::<(), crmsync::auth::StoreError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self { path: config.path }
    }

    pub fn new_default() -> Self {
        Self {
            path: TokenStoreConfig::default_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<TokenPair, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.display().to_string()))
            }
            Err(err) => return Err(StoreError::Storage(err.to_string())),
        };
        let token = match serde_json::from_str::<StoredCredential>(&raw)
            .map_err(|err| StoreError::Corruption(err.to_string()))?
        {
            StoredCredential::Versioned(file) => {
                if file.version != TOKEN_FILE_VERSION {
                    return Err(StoreError::Corruption(format!(
                        "unsupported token file version {} at {}",
                        file.version,
                        self.path.display()
                    )));
                }
                file.token
            }
            StoredCredential::Bare(token) => token,
        };
        token.validate().map_err(StoreError::Corruption)?;
        Ok(token)
    }

    fn save(&self, token: &TokenPair) -> Result<(), StoreError> {
        let file = TokenFile {
            version: TOKEN_FILE_VERSION,
            token: token.clone(),
            saved_at: Utc::now(),
        };
        let serialized =
            serde_json::to_vec_pretty(&file).map_err(|err| StoreError::Storage(err.to_string()))?;
        atomic_write(&self.path, &serialized)
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Storage(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenFile {
    version: u32,
    token: TokenPair,
    saved_at: DateTime<Utc>,
}

/// Accepts the versioned envelope and a bare token pair written by older deployments.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCredential {
    Versioned(TokenFile),
    Bare(TokenPair),
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        StoreError::Storage(format!("Token path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}
