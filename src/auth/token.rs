use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Safety margin subtracted from `expires_in` before caching an access token.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(1);

/// OAuth token pair returned by the token endpoint and persisted between runs.
///
/// # Example
/// ```
/// use crmsync::auth::TokenPair;
///
/// let pair = TokenPair {
///     token_type: "Bearer".to_string(),
///     access_token: "access".to_string(),
///     refresh_token: "refresh".to_string(),
///     expires_in: 86_400,
/// };
/// assert_eq!(pair.cache_ttl().as_secs(), 86_399);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds from issuance.
    pub expires_in: u64,
}

impl TokenPair {
    /// How long the access token may be served from cache.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.expires_in).saturating_sub(EXPIRY_MARGIN)
    }

    /// Reject pairs no caller could use.
    pub fn validate(&self) -> Result<(), String> {
        if self.access_token.is_empty() {
            return Err("access_token is empty".to_string());
        }
        if self.refresh_token.is_empty() {
            return Err("refresh_token is empty".to_string());
        }
        if self.expires_in == 0 {
            return Err("expires_in must be positive".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("token_type", &self.token_type)
            .field("access_token", &"..")
            .field("refresh_token", &"..")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
