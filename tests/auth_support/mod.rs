#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crmsync::auth::{
    ClientCredentials, CredentialManager, ManagerOptions, StoreError, TokenEndpoint, TokenPair,
    TokenStore,
};
use crmsync::crm::{AccessTokenSource, ApiHttp};
use crmsync::error::Result;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_ENDPOINT: &str = "/oauth2/access_token";

#[derive(Default)]
pub struct InMemoryTokenStore {
    token: Mutex<Option<TokenPair>>,
    fail_saves: bool,
    saves: AtomicUsize,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(token: TokenPair) -> Self {
        let store = Self::default();
        *store.token.lock().expect("store lock poisoned") = Some(token);
        store
    }

    /// A store whose saves always fail.
    pub fn read_only(token: Option<TokenPair>) -> Self {
        Self {
            token: Mutex::new(token),
            fail_saves: true,
            saves: AtomicUsize::new(0),
        }
    }

    pub fn get(&self) -> Option<TokenPair> {
        self.token.lock().expect("store lock poisoned").clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self) -> std::result::Result<TokenPair, StoreError> {
        self.get()
            .ok_or_else(|| StoreError::NotFound("in-memory".to_string()))
    }

    fn save(&self, token: &TokenPair) -> std::result::Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::Storage("read-only store".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().expect("store lock poisoned") = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> std::result::Result<(), StoreError> {
        *self.token.lock().expect("store lock poisoned") = None;
        Ok(())
    }
}

/// Token pair number `n`: access token `a{n}`, refresh token `r{n}`.
pub fn pair(n: u32, expires_in: u64) -> TokenPair {
    TokenPair {
        token_type: "Bearer".to_string(),
        access_token: format!("a{n}"),
        refresh_token: format!("r{n}"),
        expires_in,
    }
}

pub fn token_body(n: u32, expires_in: u64) -> Value {
    json!({
        "token_type": "Bearer",
        "expires_in": expires_in,
        "access_token": format!("a{n}"),
        "refresh_token": format!("r{n}"),
    })
}

/// Answer a refresh that presents `r{from}` with pair `to`.
pub fn refresh_mock(from: u32, to: u32) -> Mock {
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({
            "grant_type": "refresh_token",
            "refresh_token": format!("r{from}"),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(to, 3600)))
}

pub fn endpoint(server: &MockServer) -> TokenEndpoint {
    let http = ApiHttp::new(server.uri()).expect("http client");
    TokenEndpoint::new(
        http,
        ClientCredentials {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        },
    )
}

pub fn manager(
    server: &MockServer,
    store: Arc<dyn TokenStore>,
    options: ManagerOptions,
) -> CredentialManager {
    CredentialManager::new(Arc::new(endpoint(server)), store, options)
}

pub fn short_timeout(timeout: Duration) -> ManagerOptions {
    ManagerOptions::builder().refresh_timeout(timeout).build()
}

/// Hands out `t1`, `t2`, ... advancing only when the current token is rejected.
#[derive(Default)]
pub struct RotatingTokenSource {
    generation: AtomicUsize,
    pub issued: AtomicUsize,
}

impl RotatingTokenSource {
    pub fn invalidations(&self) -> usize {
        self.generation.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessTokenSource for RotatingTokenSource {
    async fn access_token(&self) -> Result<String> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("t{}", self.generation.load(Ordering::SeqCst) + 1))
    }

    fn invalidate(&self, rejected: &str) {
        let current = self.generation.load(Ordering::SeqCst);
        if rejected == format!("t{}", current + 1) {
            let _ = self.generation.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }
}
