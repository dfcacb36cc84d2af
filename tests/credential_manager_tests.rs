mod auth_support;

use std::sync::Arc;
use std::time::Duration;

use crmsync::auth::{
    CredentialState, FileTokenStore, ManagerOptions, TokenStore, TokenStoreConfig, MAX_CACHE_TTL,
};
use crmsync::error::CrmError;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_support::{
    manager, pair, refresh_mock, short_timeout, token_body, InMemoryTokenStore, TOKEN_ENDPOINT,
};

#[tokio::test]
async fn concurrent_callers_share_a_single_refresh_request() {
    let server = MockServer::start().await;
    refresh_mock(0, 1).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({"refresh_token": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body(2, 3600))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTokenStore::seeded(pair(0, 3600)));
    let manager = manager(&server, store.clone(), ManagerOptions::default());
    manager.initialize().await.unwrap();
    manager.invalidate();

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.access_token().await })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), "a2");
    }

    assert_eq!(store.get().unwrap().refresh_token, "r2");
    assert_eq!(store.saves(), 2);
}

#[tokio::test]
async fn hung_refresh_times_out_for_every_waiter() {
    let server = MockServer::start().await;
    refresh_mock(0, 1).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({"refresh_token": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body(2, 3600))
                .set_delay(Duration::from_secs(5)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTokenStore::seeded(pair(0, 3600)));
    let manager = manager(&server, store, short_timeout(Duration::from_millis(250)));
    manager.initialize().await.unwrap();
    manager.invalidate();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.access_token().await })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        let err = result.unwrap().unwrap_err();
        assert!(
            matches!(err, CrmError::TokenRefresh(ref m) if m.contains("timed out")),
            "unexpected error: {err:?}"
        );
    }
    assert_eq!(manager.state(), CredentialState::Ready);
}

#[tokio::test]
async fn refresh_sends_client_credentials_and_rotates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({
            "client_id": "client-id",
            "client_secret": "client-secret",
            "grant_type": "refresh_token",
            "refresh_token": "r0",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(1, 3600)))
        .expect(1)
        .mount(&server)
        .await;
    refresh_mock(1, 2).expect(1).mount(&server).await;
    refresh_mock(2, 3).expect(1).mount(&server).await;

    let store = Arc::new(InMemoryTokenStore::seeded(pair(0, 3600)));
    let manager = manager(&server, store.clone(), ManagerOptions::default());
    manager.initialize().await.unwrap();

    assert_eq!(manager.refresh().await.unwrap(), "a2");
    assert_eq!(manager.refresh().await.unwrap(), "a3");
    assert_eq!(store.get().unwrap(), pair(3, 3600));
}

#[tokio::test]
async fn missing_store_record_fails_initialize_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(1, 3600)))
        .expect(0)
        .mount(&server)
        .await;

    let manager = manager(
        &server,
        Arc::new(InMemoryTokenStore::new()),
        ManagerOptions::default(),
    );
    let err = manager.initialize().await.unwrap_err();
    assert!(matches!(err, CrmError::Bootstrap(_)));
    assert_eq!(manager.state(), CredentialState::Failed);

    for _ in 0..3 {
        assert!(matches!(
            manager.access_token().await,
            Err(CrmError::Auth(_))
        ));
    }
}

#[tokio::test]
async fn invalid_grant_makes_the_credential_terminal() {
    let server = MockServer::start().await;
    refresh_mock(0, 1).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({"refresh_token": "r1"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "hint": "Token has been revoked",
            "title": "Некорректный запрос",
            "status": 400,
            "detail": "invalid_grant",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTokenStore::seeded(pair(0, 3600)));
    let manager = manager(&server, store, ManagerOptions::default());
    manager.initialize().await.unwrap();
    manager.invalidate();

    let err = manager.access_token().await.unwrap_err();
    assert!(matches!(err, CrmError::Auth(ref m) if m.contains("invalid_grant")));
    assert_eq!(manager.state(), CredentialState::Failed);

    // No further token requests once failed.
    assert!(matches!(
        manager.refresh().await,
        Err(CrmError::Auth(_))
    ));
}

#[tokio::test]
async fn provider_outage_leaves_manager_ready_for_the_next_caller() {
    let server = MockServer::start().await;
    refresh_mock(0, 1).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({"refresh_token": "r1"})))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTokenStore::seeded(pair(0, 3600)));
    let manager = manager(
        &server,
        store,
        ManagerOptions::builder()
            .backoff(crmsync::util::backoff::BackoffPolicy::disabled())
            .build(),
    );
    manager.initialize().await.unwrap();
    manager.invalidate();

    let err = manager.access_token().await.unwrap_err();
    assert!(matches!(err, CrmError::TokenRefresh(ref m) if m.contains("503")));
    assert_eq!(manager.state(), CredentialState::Ready);
    assert_eq!(manager.status().consecutive_failures, 1);

    refresh_mock(1, 2).expect(1).mount(&server).await;
    assert_eq!(manager.access_token().await.unwrap(), "a2");
    assert_eq!(manager.status().consecutive_failures, 0);
}

#[tokio::test]
async fn oversized_expires_in_does_not_wedge_the_manager() {
    let server = MockServer::start().await;
    refresh_mock(0, 1).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({"refresh_token": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(2, u64::MAX)))
        .expect(1)
        .mount(&server)
        .await;
    refresh_mock(2, 3).expect(1).mount(&server).await;

    let store = Arc::new(InMemoryTokenStore::seeded(pair(0, 3600)));
    let manager = manager(&server, store.clone(), ManagerOptions::default());
    manager.initialize().await.unwrap();
    manager.invalidate();

    assert_eq!(manager.access_token().await.unwrap(), "a2");
    assert_eq!(manager.state(), CredentialState::Ready);
    assert!(manager.status().cached_for.unwrap() <= MAX_CACHE_TTL);
    assert_eq!(store.get().unwrap().expires_in, u64::MAX);

    assert_eq!(manager.refresh().await.unwrap(), "a3");
}

#[tokio::test]
async fn logout_while_refreshing_keeps_the_credential_gone() {
    let server = MockServer::start().await;
    refresh_mock(0, 1).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({"refresh_token": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body(2, 3600))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTokenStore::seeded(pair(0, 3600)));
    let manager = manager(&server, store.clone(), ManagerOptions::default());
    manager.initialize().await.unwrap();
    manager.invalidate();

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.access_token().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.logout().unwrap();

    assert!(matches!(pending.await.unwrap(), Err(CrmError::Auth(_))));
    assert_eq!(manager.state(), CredentialState::Uninitialized);
    assert_eq!(store.get(), None);
    assert_eq!(manager.status().cached_for, None);
}

#[tokio::test]
async fn unwritable_store_does_not_fail_a_live_refresh() {
    let server = MockServer::start().await;
    refresh_mock(0, 1).expect(1).mount(&server).await;

    let store = Arc::new(InMemoryTokenStore::read_only(Some(pair(0, 3600))));
    let manager = manager(&server, store, ManagerOptions::default());

    manager.initialize().await.unwrap();
    assert_eq!(manager.access_token().await.unwrap(), "a1");
}

#[tokio::test]
async fn bootstrap_then_restart_resumes_from_the_rotated_token() {
    let temp_dir = TempDir::new().unwrap();
    let token_path = temp_dir.path().join("nested").join("token.json");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(body_partial_json(json!({
            "grant_type": "authorization_code",
            "code": "def502",
            "redirect_uri": "https://app.example.com/callback",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(1, 86400)))
        .expect(1)
        .mount(&server)
        .await;
    refresh_mock(1, 2).expect(1).mount(&server).await;
    refresh_mock(2, 3).expect(1).mount(&server).await;

    let file_store = || Arc::new(FileTokenStore::new(TokenStoreConfig::new(token_path.clone())));

    let first = manager(&server, file_store(), ManagerOptions::default());
    first
        .bootstrap("def502", "https://app.example.com/callback")
        .await
        .unwrap();
    assert_eq!(first.state(), CredentialState::Ready);
    assert_eq!(first.access_token().await.unwrap(), "a1");
    first.refresh().await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
    assert_eq!(raw["version"], 1);
    assert_eq!(raw["token"]["refresh_token"], "r2");

    let restarted = manager(&server, file_store(), ManagerOptions::default());
    restarted.initialize().await.unwrap();
    assert_eq!(restarted.access_token().await.unwrap(), "a3");
    assert_eq!(file_store().load().unwrap().refresh_token, "r3");
}

#[tokio::test]
async fn rejected_authorization_code_fails_bootstrap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid code"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryTokenStore::new());
    let manager = manager(&server, store.clone(), ManagerOptions::default());
    let err = manager
        .bootstrap("expired", "https://app.example.com/callback")
        .await
        .unwrap_err();

    assert!(matches!(err, CrmError::Bootstrap(_)));
    assert_eq!(manager.state(), CredentialState::Failed);
    assert_eq!(store.get(), None);
}

#[tokio::test]
async fn logout_removes_the_credential_file() {
    let temp_dir = TempDir::new().unwrap();
    let token_path = temp_dir.path().join("token.json");
    let server = MockServer::start().await;
    refresh_mock(0, 1).expect(1).mount(&server).await;

    let store = Arc::new(FileTokenStore::new(TokenStoreConfig::new(token_path.clone())));
    store.save(&pair(0, 3600)).unwrap();
    let manager = manager(&server, store, ManagerOptions::default());
    manager.initialize().await.unwrap();

    manager.logout().unwrap();

    assert!(!token_path.exists());
    assert_eq!(manager.state(), CredentialState::Uninitialized);
    assert!(matches!(
        manager.access_token().await,
        Err(CrmError::Auth(_))
    ));
}
