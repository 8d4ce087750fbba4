//! End-to-end session scenarios: concurrent expiry, failed refresh, anonymous
//! requests, deep-link bootstrap and persistence across restarts.

mod common;

use std::sync::Arc;

use aurea_core::config::CANONICAL_ACCESS_TOKEN_KEY;
use aurea_core::session::{ApiRequest, BootstrapOutcome, LoginCredentials, MemoryAddressBar};
use aurea_core::storage::{FileStore, KeyValueStore};
use aurea_core::{AureaError, SessionState};
use futures_util::future::join_all;
use mockito::Matcher;
use serde_json::Value;

use common::{memory_session, session_over, SAMPLE_JWT, SAMPLE_REFRESH_JWT};

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let mut server = mockito::Server::new_async().await;
    let stale = server
        .mock("GET", "/pix/balance")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .expect(5)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .match_body(Matcher::Json(serde_json::json!({"refresh_token": "rt-1"})))
        .with_status(200)
        .with_body(r#"{"access_token": "new", "refresh_token": "rt-2"}"#)
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/pix/balance")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(r#"{"balance_cents": 990}"#)
        .expect(5)
        .create_async()
        .await;

    let session = memory_session(&server.url());
    session.tokens().set_access_token("old");
    session.tokens().set_refresh_token("rt-1");

    let request = ApiRequest::get("/pix/balance");
    let results = join_all((0..5).map(|_| session.dispatcher().send_json::<Value>(&request))).await;

    for result in results {
        assert_eq!(result.unwrap()["balance_cents"], 990);
    }
    assert_eq!(session.tokens().get_access_token().as_deref(), Some("new"));
    assert_eq!(session.tokens().get_refresh_token().as_deref(), Some("rt-2"));
    assert_eq!(session.state(), SessionState::Authenticated);
    stale.assert_async().await;
    refresh.assert_async().await;
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_failed_refresh_expires_every_caller() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/pix/extrato")
        .with_status(401)
        .expect(3)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .with_body(r#"{"error": "invalid_grant"}"#)
        .expect(1)
        .create_async()
        .await;

    let session = memory_session(&server.url());
    session.tokens().set_access_token("old");
    session.tokens().set_refresh_token("rt-1");

    let request = ApiRequest::get("/pix/extrato");
    let results = join_all((0..3).map(|_| session.dispatcher().send_json::<Value>(&request))).await;

    for result in results {
        assert!(matches!(result, Err(AureaError::AuthExpired)));
    }
    assert_eq!(session.tokens().get_access_token(), None);
    assert_eq!(session.tokens().get_refresh_token(), None);
    assert_eq!(session.state(), SessionState::Expired);
    refresh.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_401s_share_one_refresh() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/pix/balance")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"access_token": "new", "refresh_token": "rt-2"}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/pix/balance")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(r#"{"balance_cents": 990}"#)
        .create_async()
        .await;

    let session = memory_session(&server.url());
    session.tokens().set_access_token("old");
    session.tokens().set_refresh_token("rt-1");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = session.dispatcher().clone();
            tokio::spawn(async move {
                dispatcher
                    .send_json::<Value>(&ApiRequest::get("/pix/balance"))
                    .await
            })
        })
        .collect();

    for task in join_all(tasks).await {
        assert_eq!(task.unwrap().unwrap()["balance_cents"], 990);
    }
    refresh.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_401s_share_one_failed_refresh() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/pix/extrato")
        .with_status(401)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let session = memory_session(&server.url());
    session.tokens().set_access_token("old");
    session.tokens().set_refresh_token("rt-1");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = session.dispatcher().clone();
            tokio::spawn(async move {
                dispatcher
                    .send_json::<Value>(&ApiRequest::get("/pix/extrato"))
                    .await
            })
        })
        .collect();

    for task in join_all(tasks).await {
        assert!(matches!(task.unwrap(), Err(AureaError::AuthExpired)));
    }
    assert_eq!(session.tokens().get_access_token(), None);
    assert_eq!(session.tokens().get_refresh_token(), None);
    assert_eq!(session.state(), SessionState::Expired);
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_rejected_refreshed_token_signs_out() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/pix/extrato")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"access_token": "at-2", "refresh_token": "rt-2"}"#)
        .create_async()
        .await;

    let session = memory_session(&server.url());
    session.tokens().set_access_token("at-1");
    session.tokens().set_refresh_token("rt-1");

    let err = session
        .dispatcher()
        .send_json::<Value>(&ApiRequest::get("/pix/extrato"))
        .await
        .unwrap_err();

    assert!(matches!(err, AureaError::AuthExpired));
    assert_eq!(session.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn test_anonymous_request_has_no_bearer_and_no_refresh() {
    let mut server = mockito::Server::new_async().await;
    let protected = server
        .mock("GET", "/pix/balance")
        .match_header("authorization", Matcher::Missing)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .expect(0)
        .create_async()
        .await;

    let session = memory_session(&server.url());
    let err = session
        .dispatcher()
        .send_json::<Value>(&ApiRequest::get("/pix/balance"))
        .await
        .unwrap_err();

    assert!(matches!(err, AureaError::AuthExpired));
    assert_eq!(session.state(), SessionState::Anonymous);
    protected.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_bootstrapped_token_authenticates_requests() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/pix/balance")
        .match_header("authorization", format!("Bearer {SAMPLE_JWT}").as_str())
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let session = memory_session(&server.url());
    let bar = MemoryAddressBar::new(format!(
        "https://app.aurea.gold/#/dashboard?at={SAMPLE_JWT}&rt={SAMPLE_REFRESH_JWT}"
    ));

    assert_eq!(
        session.bootstrap(&bar),
        BootstrapOutcome::Stored {
            refresh_token: true
        }
    );
    assert_eq!(session.bootstrap(&bar), BootstrapOutcome::AlreadyRan);
    assert_eq!(bar.url(), "https://app.aurea.gold/#/dashboard");
    assert_eq!(
        session.tokens().get_refresh_token().as_deref(),
        Some(SAMPLE_REFRESH_JWT)
    );

    session
        .dispatcher()
        .send_json::<Value>(&ApiRequest::get("/pix/balance"))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_login_survives_restart_with_file_store() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_body(r#"{"token": "at-1", "refresh_token": "rt-1"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let session = session_over(&server.url(), store);
        session
            .login(&LoginCredentials::new("ana@aurea.gold", "hunter2"))
            .await
            .unwrap();
    }

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    assert_eq!(
        store.get(CANONICAL_ACCESS_TOKEN_KEY).unwrap().as_deref(),
        Some("at-1")
    );
    let session = session_over(&server.url(), store);
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.tokens().get_refresh_token().as_deref(), Some("rt-1"));

    session.logout();
    assert_eq!(session.state(), SessionState::Anonymous);
}

#[test]
fn test_legacy_alias_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    store.set("auth_token", "legacy-at").unwrap();

    let session = session_over("https://api.aurea.gold", store);
    assert_eq!(
        session.tokens().get_access_token().as_deref(),
        Some("legacy-at")
    );
    assert_eq!(session.state(), SessionState::Authenticated);
}
