//! OAuth credential lifecycle: token pair, persistence, cache, grants and the manager.

pub mod cache;
pub mod error;
pub mod grant;
pub mod manager;
pub mod store;
pub mod token;

pub use cache::{ExpiringTokenCache, MAX_CACHE_TTL};
pub use error::StoreError;
pub use grant::{ClientCredentials, GrantError, TokenEndpoint, TokenGrant, TOKEN_PATH};
pub use manager::{CredentialManager, CredentialState, CredentialStatus, ManagerOptions};
pub use store::{FileTokenStore, TokenStore, TokenStoreConfig};
pub use token::TokenPair;
