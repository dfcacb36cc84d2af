//! Credential lifecycle: load, refresh on demand, single-flight coordination.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use futures::future::{BoxFuture, FutureExt, Shared};
use strum::Display;
use thiserror::Error;
use tokio::time::Instant;

use super::cache::ExpiringTokenCache;
use super::error::StoreError;
use super::grant::{GrantError, TokenGrant};
use super::store::TokenStore;
use super::token::TokenPair;
use crate::crm::middleware::AccessTokenSource;
use crate::error::{CrmError, Result};
use crate::util::backoff::BackoffPolicy;
use crate::util::timeout::{with_timeout, TimedOut};

/// Upper bound on a single grant request, shared by every waiting caller.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle states of the credential manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CredentialState {
    Uninitialized,
    Loading,
    Ready,
    Refreshing,
    /// The credential is unusable until the authorization-code bootstrap runs again.
    Failed,
}

/// Tunables for [`CredentialManager`].
#[derive(Debug, Clone, Builder)]
pub struct ManagerOptions {
    #[builder(default = DEFAULT_REFRESH_TIMEOUT)]
    pub refresh_timeout: Duration,
    #[builder(default)]
    pub backoff: BackoffPolicy,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Point-in-time view of the manager for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    pub state: CredentialState,
    /// Time left on the cached access token, if one is live.
    pub cached_for: Option<Duration>,
    pub consecutive_failures: u32,
}

/// Outcome of a refresh, cloned to every caller sharing it.
#[derive(Debug, Clone, Error)]
enum RefreshFailure {
    #[error("refresh token rejected: {0}")]
    Rejected(String),
    #[error("{0}")]
    Transient(String),
    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),
    #[error("refresh suppressed for another {0:?} after repeated failures")]
    BackingOff(Duration),
    #[error("{0}")]
    Unavailable(String),
}

impl From<GrantError> for RefreshFailure {
    fn from(error: GrantError) -> Self {
        match error {
            GrantError::Rejected { status, body } => {
                Self::Rejected(format!("status {status}: {body}"))
            }
            GrantError::Transient(message) => Self::Transient(message),
        }
    }
}

impl From<TimedOut> for RefreshFailure {
    fn from(timed_out: TimedOut) -> Self {
        Self::TimedOut(timed_out.0)
    }
}

impl From<RefreshFailure> for CrmError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Rejected(_) | RefreshFailure::Unavailable(_) => {
                CrmError::Auth(failure.to_string())
            }
            RefreshFailure::Transient(_)
            | RefreshFailure::TimedOut(_)
            | RefreshFailure::BackingOff(_) => CrmError::TokenRefresh(failure.to_string()),
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, std::result::Result<String, RefreshFailure>>>;

const SUPERSEDED: &str = "credential was replaced while the request was in flight";

struct InFlight {
    ticket: u64,
    refresh: SharedRefresh,
}

struct Lifecycle {
    state: CredentialState,
    /// Latest pair; only its refresh token is ever sent.
    current: Option<TokenPair>,
    consecutive_failures: u32,
    retry_after: Option<Instant>,
    /// Bumped by initialize, bootstrap and logout. Grant results from an
    /// older generation are discarded.
    generation: u64,
}

impl Lifecycle {
    fn begin(&mut self, state: CredentialState) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.state = state;
        self.consecutive_failures = 0;
        self.retry_after = None;
        self.generation
    }
}

struct Inner {
    grant: Arc<dyn TokenGrant>,
    store: Arc<dyn TokenStore>,
    cache: ExpiringTokenCache,
    lifecycle: Mutex<Lifecycle>,
    in_flight: Mutex<Option<InFlight>>,
    next_ticket: AtomicU64,
    options: ManagerOptions,
}

/// Frees the single-flight slot however the refresh future ends.
struct SlotRelease {
    inner: Arc<Inner>,
    ticket: u64,
    generation: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let released = {
            let mut slot = self.inner.in_flight();
            match slot.as_ref() {
                Some(f) if f.ticket == self.ticket => slot.take(),
                _ => None,
            }
        };
        drop(released);
        let mut lifecycle = self.inner.lifecycle();
        if lifecycle.generation == self.generation
            && lifecycle.state == CredentialState::Refreshing
        {
            tracing::warn!("refresh ended abnormally; leaving refreshing state");
            lifecycle.state = if lifecycle.current.is_some() {
                CredentialState::Ready
            } else {
                CredentialState::Uninitialized
            };
        }
    }
}

/// Process-wide owner of the OAuth credential.
///
/// The [`ExpiringTokenCache`] is the only fast-path authority on whether a
/// refresh is needed; the [`TokenStore`] mirrors the latest pair for restarts.
/// Concurrent callers that miss the cache share one refresh request.
///
/// Cloning is cheap and every clone drives the same credential.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use crmsync::auth::{
///     ClientCredentials, CredentialManager, FileTokenStore, ManagerOptions, TokenEndpoint,
/// };
/// use crmsync::crm::ApiHttp;
///
/// # async fn example() -> crmsync::error::Result<()> {
/// let http = ApiHttp::new("https://example.amocrm.ru")?;
/// let endpoint = TokenEndpoint::new(
///     http,
///     ClientCredentials {
///         client_id: "id".to_string(),
///         client_secret: "secret".to_string(),
///     },
/// );
/// let manager = CredentialManager::new(
///     Arc::new(endpoint),
///     Arc::new(FileTokenStore::new_default()),
///     ManagerOptions::default(),
/// );
/// manager.initialize().await?;
/// let token = manager.access_token().await?;
/// # let _ = token;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

impl CredentialManager {
    pub fn new(
        grant: Arc<dyn TokenGrant>,
        store: Arc<dyn TokenStore>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                grant,
                store,
                cache: ExpiringTokenCache::new(),
                lifecycle: Mutex::new(Lifecycle {
                    state: CredentialState::Uninitialized,
                    current: None,
                    consecutive_failures: 0,
                    retry_after: None,
                    generation: 0,
                }),
                in_flight: Mutex::new(None),
                next_ticket: AtomicU64::new(0),
                options,
            }),
        }
    }

    pub fn state(&self) -> CredentialState {
        self.inner.lifecycle().state
    }

    pub fn status(&self) -> CredentialStatus {
        let lifecycle = self.inner.lifecycle();
        CredentialStatus {
            state: lifecycle.state,
            cached_for: self.inner.cache.remaining(),
            consecutive_failures: lifecycle.consecutive_failures,
        }
    }

    /// Load the persisted credential and validate it with one refresh.
    ///
    /// Ends in [`CredentialState::Ready`] or [`CredentialState::Failed`]. A call
    /// made while another load is refreshing waits for that refresh.
    pub async fn initialize(&self) -> Result<()> {
        let begun = {
            let mut slot = self.inner.in_flight();
            let mut lifecycle = self.inner.lifecycle();
            match lifecycle.state {
                CredentialState::Uninitialized | CredentialState::Failed => {
                    Ok((lifecycle.begin(CredentialState::Loading), slot.take()))
                }
                CredentialState::Ready => {
                    tracing::debug!("credential manager already initialized");
                    return Ok(());
                }
                CredentialState::Loading | CredentialState::Refreshing => {
                    Err(slot.as_ref().map(|f| f.refresh.clone()))
                }
            }
        };
        let generation = match begun {
            Ok((generation, abandoned)) => {
                drop(abandoned);
                generation
            }
            Err(pending) => return self.join_pending_load(pending).await,
        };
        tracing::info!("loading persisted credential");

        let pair = match self.inner.store.load() {
            Ok(pair) => pair,
            Err(StoreError::NotFound(location)) => {
                return Err(self.fail_bootstrap(
                    generation,
                    format!(
                        "no persisted credential at {location}; run the authorization-code bootstrap"
                    ),
                ));
            }
            Err(err) => return Err(self.fail_bootstrap(generation, err.to_string())),
        };
        {
            let mut lifecycle = self.inner.lifecycle();
            if lifecycle.generation != generation {
                return Err(CrmError::Bootstrap(SUPERSEDED.to_string()));
            }
            lifecycle.current = Some(pair);
        }

        match self.inner.clone().refresh_shared(true).await {
            Ok(_) => {
                tracing::info!("persisted credential validated");
                Ok(())
            }
            Err(failure) => Err(self.fail_bootstrap(
                generation,
                format!("persisted refresh token could not be used: {failure}"),
            )),
        }
    }

    async fn join_pending_load(&self, pending: Option<SharedRefresh>) -> Result<()> {
        let Some(pending) = pending else {
            return Err(CrmError::Auth(
                "credential is still loading; try again shortly".to_string(),
            ));
        };
        tracing::debug!("waiting for the load already in progress");
        let outcome = pending.await;
        match (self.state(), outcome) {
            (CredentialState::Ready, _) => Ok(()),
            (_, Err(failure)) => Err(CrmError::Bootstrap(format!(
                "persisted refresh token could not be used: {failure}"
            ))),
            (state, Ok(_)) => Err(CrmError::Bootstrap(format!(
                "credential load finished in state {state}"
            ))),
        }
    }

    /// Exchange an authorization code obtained out of band for a fresh pair.
    ///
    /// Persistence is mandatory here: without a stored copy the credential
    /// would not survive a restart.
    pub async fn bootstrap(&self, code: &str, redirect_uri: &str) -> Result<()> {
        let generation = self.inner.supersede(CredentialState::Loading);
        tracing::info!("exchanging authorization code");

        let exchanged = with_timeout(self.inner.options.refresh_timeout, async {
            self.inner
                .grant
                .exchange_code(code, redirect_uri)
                .await
                .map_err(RefreshFailure::from)
        })
        .await;
        let pair = match exchanged {
            Ok(pair) => pair,
            Err(failure) => {
                return Err(self.fail_bootstrap(
                    generation,
                    format!("authorization code exchange failed: {failure}"),
                ))
            }
        };

        let mut lifecycle = self.inner.lifecycle();
        if lifecycle.generation != generation {
            tracing::warn!("credential replaced during code exchange; discarding issued pair");
            return Err(CrmError::Bootstrap(SUPERSEDED.to_string()));
        }
        self.inner
            .cache
            .put(pair.access_token.clone(), pair.cache_ttl());
        if let Err(err) = self.inner.store.save(&pair) {
            tracing::error!(error = %err, "bootstrap credential could not be persisted");
            self.inner.cache.invalidate();
            lifecycle.state = CredentialState::Failed;
            lifecycle.current = None;
            return Err(err.into());
        }
        lifecycle.current = Some(pair);
        lifecycle.state = CredentialState::Ready;
        tracing::info!("credential bootstrapped");
        Ok(())
    }

    /// A valid access token, refreshing first when the cache is empty.
    pub async fn access_token(&self) -> Result<String> {
        self.inner.ensure_usable()?;
        if let Some(token) = self.inner.cache.get() {
            return Ok(token);
        }
        self.inner
            .clone()
            .refresh_shared(false)
            .await
            .map_err(CrmError::from)
    }

    /// Refresh now, even when the cached token is still live.
    ///
    /// Joins a refresh already in flight instead of starting another.
    pub async fn refresh(&self) -> Result<String> {
        self.inner.ensure_usable()?;
        self.inner
            .clone()
            .refresh_shared(true)
            .await
            .map_err(CrmError::from)
    }

    /// Drop the cached access token.
    pub fn invalidate(&self) {
        tracing::debug!("invalidating cached access token");
        self.inner.cache.invalidate();
    }

    /// Drop the cached access token if it is still `rejected`.
    ///
    /// A rejection that arrives after another caller already refreshed leaves
    /// the newer token in place.
    pub fn invalidate_if(&self, rejected: &str) -> bool {
        let removed = self.inner.cache.invalidate_if(rejected);
        tracing::debug!(removed, "access token rejected by the API");
        removed
    }

    /// Forget the credential in memory and on disk.
    ///
    /// A refresh still in flight is abandoned and its result discarded.
    pub fn logout(&self) -> Result<()> {
        self.inner.supersede(CredentialState::Uninitialized);
        self.inner.cache.invalidate();
        self.inner.store.clear().map_err(|err| {
            tracing::error!(error = %err, "failed to clear persisted credential");
            CrmError::from(err)
        })?;
        tracing::info!("credential cleared");
        Ok(())
    }

    fn fail_bootstrap(&self, generation: u64, reason: String) -> CrmError {
        tracing::error!(%reason, "credential bootstrap failed");
        let mut lifecycle = self.inner.lifecycle();
        if lifecycle.generation == generation {
            self.inner.cache.invalidate();
            lifecycle.state = CredentialState::Failed;
            lifecycle.current = None;
        }
        CrmError::Bootstrap(reason)
    }
}

impl Inner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the current pair, abandon any refresh in flight and start a
    /// new generation in `state`.
    fn supersede(&self, state: CredentialState) -> u64 {
        let (generation, abandoned) = {
            let mut slot = self.in_flight();
            let mut lifecycle = self.lifecycle();
            lifecycle.current = None;
            (lifecycle.begin(state), slot.take())
        };
        // The last handle runs the refresh's slot release, which takes both locks.
        drop(abandoned);
        generation
    }

    fn ensure_usable(&self) -> Result<()> {
        let lifecycle = self.lifecycle();
        match lifecycle.state {
            CredentialState::Failed => Err(CrmError::Auth(
                "credential is unusable; re-run the authorization-code bootstrap".to_string(),
            )),
            _ if lifecycle.current.is_none() => Err(CrmError::Auth(
                "credential manager is not initialized".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Join the refresh in flight or start one.
    ///
    /// `force` skips the cache re-check and the backoff window.
    fn refresh_shared(self: Arc<Self>, force: bool) -> SharedRefresh {
        let mut slot = self.in_flight();
        if let Some(existing) = slot.as_ref() {
            return existing.refresh.clone();
        }
        if !force {
            // A refresh may have completed between the caller's cache miss and now.
            if let Some(token) = self.cache.get() {
                return futures::future::ready(Ok(token)).boxed().shared();
            }
            if let Some(wait) = self.backoff_remaining() {
                tracing::debug!(?wait, "refresh suppressed by backoff");
                return futures::future::ready(Err(RefreshFailure::BackingOff(wait)))
                    .boxed()
                    .shared();
            }
        }

        let generation = self.lifecycle().generation;
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let inner = self.clone();
        let refresh = async move {
            let _release = SlotRelease {
                inner: inner.clone(),
                ticket,
                generation,
            };
            AssertUnwindSafe(inner.run_refresh(generation))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!("token grant panicked during refresh");
                    Err(RefreshFailure::Transient(
                        "token grant panicked during refresh".to_string(),
                    ))
                })
        }
        .boxed()
        .shared();
        *slot = Some(InFlight {
            ticket,
            refresh: refresh.clone(),
        });
        refresh
    }

    fn backoff_remaining(&self) -> Option<Duration> {
        let retry_after = self.lifecycle().retry_after?;
        let remaining = retry_after.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then_some(remaining)
    }

    async fn run_refresh(&self, generation: u64) -> std::result::Result<String, RefreshFailure> {
        let (refresh_token, resume_state) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.generation != generation {
                return Err(RefreshFailure::Unavailable(SUPERSEDED.to_string()));
            }
            if lifecycle.state == CredentialState::Failed {
                return Err(RefreshFailure::Unavailable(
                    "credential is unusable; re-run the authorization-code bootstrap".to_string(),
                ));
            }
            let Some(current) = lifecycle.current.as_ref() else {
                return Err(RefreshFailure::Unavailable(
                    "credential manager is not initialized".to_string(),
                ));
            };
            let refresh_token = current.refresh_token.clone();
            let resume_state = match lifecycle.state {
                CredentialState::Loading => CredentialState::Loading,
                _ => CredentialState::Ready,
            };
            lifecycle.state = CredentialState::Refreshing;
            (refresh_token, resume_state)
        };

        tracing::info!("refreshing access token");
        let outcome = with_timeout(self.options.refresh_timeout, async {
            self.grant
                .refresh(&refresh_token)
                .await
                .map_err(RefreshFailure::from)
        })
        .await;

        match outcome {
            Ok(pair) => self.adopt(pair, generation),
            Err(failure) => self.handle_failure(failure, resume_state, generation),
        }
    }

    /// Install a freshly issued pair: cache first, then the durable mirror.
    fn adopt(
        &self,
        pair: TokenPair,
        generation: u64,
    ) -> std::result::Result<String, RefreshFailure> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.generation != generation {
            tracing::warn!("credential replaced during refresh; discarding issued pair");
            return Err(RefreshFailure::Unavailable(SUPERSEDED.to_string()));
        }

        let access_token = pair.access_token.clone();
        self.cache.put(access_token.clone(), pair.cache_ttl());
        if let Err(err) = self.store.save(&pair) {
            tracing::warn!(
                error = %err,
                "refreshed credential could not be persisted; continuing with cached token"
            );
        }

        lifecycle.current = Some(pair);
        lifecycle.state = CredentialState::Ready;
        lifecycle.consecutive_failures = 0;
        lifecycle.retry_after = None;
        tracing::info!("access token refreshed");
        Ok(access_token)
    }

    fn handle_failure(
        &self,
        failure: RefreshFailure,
        resume_state: CredentialState,
        generation: u64,
    ) -> std::result::Result<String, RefreshFailure> {
        let failures = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.generation != generation {
                tracing::debug!(error = %failure, "ignoring failure of a superseded refresh");
                return Err(failure);
            }
            if let RefreshFailure::Rejected(_) = failure {
                tracing::error!(error = %failure, "refresh token rejected; credential is now unusable");
                self.cache.invalidate();
                lifecycle.state = CredentialState::Failed;
                lifecycle.current = None;
                return Err(failure);
            }
            lifecycle.state = resume_state;
            lifecycle.consecutive_failures = lifecycle.consecutive_failures.saturating_add(1);
            let delay = self.options.backoff.delay_for(lifecycle.consecutive_failures);
            lifecycle.retry_after = (!delay.is_zero()).then(|| Instant::now() + delay);
            lifecycle.consecutive_failures
        };

        if let Some(token) = self.cache.get() {
            tracing::warn!(
                error = %failure,
                consecutive_failures = failures,
                "refresh failed; serving still-valid cached token"
            );
            return Ok(token);
        }
        tracing::warn!(
            error = %failure,
            consecutive_failures = failures,
            "refresh failed"
        );
        Err(failure)
    }
}

#[async_trait]
impl AccessTokenSource for CredentialManager {
    async fn access_token(&self) -> Result<String> {
        CredentialManager::access_token(self).await
    }

    fn invalidate(&self, rejected: &str) {
        self.invalidate_if(rejected);
    }
}
