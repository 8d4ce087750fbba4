//! Idempotent mutations: one key per intent, reused on every retry.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::Response;

use crate::error::{AureaError, AureaResult};
use crate::idempotency::{IdempotencyKey, IDEMPOTENCY_KEY_HEADER};
use crate::session::{ApiRequest, RequestDispatcher};

/// How a mutation retries transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: usize,
    /// First backoff delay.
    pub min_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// A single user intent to change state on the backend, e.g. one PIX
/// transfer. Owns its [`IdempotencyKey`] for its whole lifetime.
#[derive(Debug, Clone)]
pub struct Mutation {
    key: IdempotencyKey,
    request: ApiRequest,
}

impl Mutation {
    /// Starts a new intent. The key is created here, before the first attempt.
    #[must_use]
    pub fn new(intent_label: &str, request: ApiRequest) -> Self {
        Self::with_key(IdempotencyKey::create(intent_label), request)
    }

    /// Replays an intent whose outcome was unknown, under its original key.
    #[must_use]
    pub fn with_key(key: IdempotencyKey, request: ApiRequest) -> Self {
        let request = request.header(IDEMPOTENCY_KEY_HEADER, key.as_str());
        Self { key, request }
    }

    /// The key every attempt of this intent carries.
    #[must_use]
    pub const fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    pub(crate) const fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Sends the mutation, retrying transport failures under the same key.
    ///
    /// Only `NetworkError`s are retried: any response, including an error
    /// status, is returned as-is for the caller to interpret.
    ///
    /// # Errors
    ///
    /// Returns `MutationOutcomeUnknown` when every attempt failed in
    /// transport: the backend may or may not have executed the mutation, and
    /// replaying it with [`Mutation::with_key`] is safe. Other dispatcher
    /// errors are returned unchanged.
    pub async fn send(
        &self,
        dispatcher: &RequestDispatcher,
        policy: &MutationPolicy,
    ) -> AureaResult<Response> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(policy.min_delay)
            .with_max_delay(policy.max_delay)
            .with_max_times(policy.max_retries);

        (|| async { dispatcher.send(&self.request).await })
            .retry(backoff)
            .when(AureaError::is_network)
            .notify(|err: &AureaError, delay: Duration| {
                log::warn!(
                    "mutation {} failed in transport, retrying in {delay:?}: {err}",
                    self.key
                );
            })
            .await
            .map_err(|err| match err {
                AureaError::NetworkError { error, .. } => AureaError::MutationOutcomeUnknown {
                    idempotency_key: self.key.to_string(),
                    error,
                },
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockito::Matcher;

    use super::*;
    use crate::config::SessionConfig;
    use crate::session::Session;
    use crate::storage::MemoryStore;

    fn fast_policy() -> MutationPolicy {
        MutationPolicy {
            max_retries: 2,
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_key_is_attached_once() {
        let mutation = Mutation::new("pix-send", ApiRequest::post("/pix/send"));
        let replay = Mutation::with_key(mutation.key().clone(), ApiRequest::post("/pix/send"));

        assert_eq!(
            mutation.request.header_value(IDEMPOTENCY_KEY_HEADER),
            Some(mutation.key().as_str())
        );
        assert_eq!(replay.key(), mutation.key());
    }

    #[test]
    fn test_distinct_intents_get_distinct_keys() {
        let first = Mutation::new("pix-send", ApiRequest::post("/pix/send"));
        let second = Mutation::new("pix-send", ApiRequest::post("/pix/send"));
        assert_ne!(first.key(), second.key());
    }

    #[tokio::test]
    async fn test_error_status_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mutation = Mutation::new("pix-send", ApiRequest::post("/pix/send"));
        let mock = server
            .mock("POST", "/pix/send")
            .match_header("idempotency-key", mutation.key().as_str())
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let session = Session::new(
            SessionConfig::default().with_api_url(server.url()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let response = mutation
            .send(session.dispatcher(), &fast_policy())
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_unknown_outcome() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = Session::new(
            SessionConfig::default().with_api_url(format!("http://{addr}")),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let mutation = Mutation::new("pix-send", ApiRequest::post("/pix/send"));

        let err = mutation
            .send(session.dispatcher(), &fast_policy())
            .await
            .unwrap_err();
        match err {
            AureaError::MutationOutcomeUnknown {
                idempotency_key, ..
            } => assert_eq!(idempotency_key, mutation.key().as_str()),
            other => panic!("expected MutationOutcomeUnknown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_retry_keeps_the_key() {
        let mut server = mockito::Server::new_async().await;
        let mutation = Mutation::new("pix-send", ApiRequest::post("/pix/send"));
        let key = mutation.key().as_str().to_string();
        let stale = server
            .mock("POST", "/pix/send")
            .match_header("authorization", "Bearer at-1")
            .match_header("idempotency-key", key.as_str())
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body(r#"{"access_token": "at-2"}"#)
            .create_async()
            .await;
        let fresh = server
            .mock("POST", "/pix/send")
            .match_header("authorization", "Bearer at-2")
            .match_header("idempotency-key", Matcher::Exact(key.clone()))
            .with_status(201)
            .create_async()
            .await;

        let session = Session::new(
            SessionConfig::default().with_api_url(server.url()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        session.tokens().set_access_token("at-1");
        session.tokens().set_refresh_token("rt-1");

        let response = mutation
            .send(session.dispatcher(), &fast_policy())
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        stale.assert_async().await;
        fresh.assert_async().await;
    }
}
