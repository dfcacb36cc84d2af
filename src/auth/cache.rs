//! TTL-bound holder of the current access token.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Longest lifetime an entry is kept, whatever the issuer claims.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Single-entry cache whose contents vanish once their TTL elapses.
///
/// Absence of an entry means a refresh is needed. Time is read from
/// [`tokio::time::Instant`], so paused-clock tests can drive expiry.
#[derive(Debug, Default)]
pub struct ExpiringTokenCache {
    entry: Mutex<Option<CacheEntry>>,
}

#[derive(Debug)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl ExpiringTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `token` for `ttl`, capped at [`MAX_CACHE_TTL`]. A zero TTL stores nothing.
    pub fn put(&self, token: impl Into<String>, ttl: Duration) {
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        let expires_at = match Instant::now().checked_add(ttl.min(MAX_CACHE_TTL)) {
            Some(expires_at) if !ttl.is_zero() => expires_at,
            _ => {
                *entry = None;
                return;
            }
        };
        *entry = Some(CacheEntry {
            value: token.into(),
            expires_at,
        });
    }

    /// The cached token, or `None` when missing or expired.
    pub fn get(&self) -> Option<String> {
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = entry
            .as_ref()
            .map(|e| Instant::now() >= e.expires_at)?;
        if expired {
            *entry = None;
            return None;
        }
        entry.as_ref().map(|e| e.value.clone())
    }

    /// Time left before the cached token expires.
    pub fn remaining(&self) -> Option<Duration> {
        let entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = entry
            .as_ref()?
            .expires_at
            .saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Drop the cached token.
    pub fn invalidate(&self) {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Drop the cached token only if it is still `token`.
    ///
    /// Returns whether an entry was removed.
    pub fn invalidate_if(&self, token: &str) -> bool {
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        if entry.as_ref().is_some_and(|e| e.value == token) {
            *entry = None;
            return true;
        }
        false
    }
}
