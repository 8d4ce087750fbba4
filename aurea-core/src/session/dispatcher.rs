//! Authenticated request dispatch with one refresh-and-retry on 401.

use std::sync::Arc;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AureaError, AureaResult};
use crate::http_request::{unexpected_status, Transport};

use super::refresh::RefreshCoordinator;
use super::token_store::TokenStore;

/// A request to the API, kept as data so it can be reissued after a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    retry_on_unauthorized: bool,
}

impl ApiRequest {
    /// A request with `method` to `path` (relative to the API base URL).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            retry_on_unauthorized: true,
        }
    }

    /// A GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Opts out of the refresh-and-retry on 401.
    #[must_use]
    pub const fn no_retry(mut self) -> Self {
        self.retry_on_unauthorized = false;
        self
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn path_without_query(&self) -> &str {
        self.path
            .split_once('?')
            .map_or(self.path.as_str(), |(path, _)| path)
    }
}

/// Wraps outbound requests with the bearer header and recovers once from an
/// expired access token.
///
/// Guarantees per original request: at most one refresh and at most one
/// retry. Concurrent requests that hit 401 together share one refresh.
#[derive(Clone)]
pub struct RequestDispatcher {
    tokens: Arc<TokenStore>,
    refresher: RefreshCoordinator,
    transport: Arc<Transport>,
    excluded_paths: Vec<String>,
}

impl RequestDispatcher {
    /// Creates a dispatcher. Requests to `excluded_paths` (login and refresh)
    /// are sent as-is: no bearer header, no 401 handling.
    #[must_use]
    pub fn new(
        tokens: Arc<TokenStore>,
        refresher: RefreshCoordinator,
        transport: Arc<Transport>,
        excluded_paths: Vec<String>,
    ) -> Self {
        Self {
            tokens,
            refresher,
            transport,
            excluded_paths,
        }
    }

    /// Sends `request` and returns the final response.
    ///
    /// A 401 on a retryable request triggers one refresh, or reuses the token
    /// another request already obtained. With a new token the request is
    /// reissued once and that response is final, whatever its status. Without
    /// one, or when the reissued request is still unauthorized, both tokens
    /// are cleared. Without a new token the original 401 is returned.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` when a request produces no response at all.
    pub async fn send(&self, request: &ApiRequest) -> AureaResult<Response> {
        if !self.is_intercepted(request) {
            return self.issue(request, None).await;
        }

        let sent_token = self.tokens.get_access_token();
        let response = self.issue(request, sent_token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || !request.retry_on_unauthorized {
            return Ok(response);
        }

        let Some(token) = self.refresher.replace_rejected(sent_token.as_deref()).await else {
            log::info!("session expired on {}, clearing tokens", request.path);
            self.expire();
            return Ok(response);
        };

        log::debug!("retrying {} with a new access token", request.path);
        let retried = self.issue(request, Some(&token)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            log::info!("{} still unauthorized after refresh, clearing tokens", request.path);
            self.expire();
        }
        Ok(retried)
    }

    /// Sends `request` and decodes a successful JSON body.
    ///
    /// # Errors
    ///
    /// `AuthExpired` if the final response is 401 and the session was
    /// cleared, `UnexpectedStatus` for any other non-success status (a 401 on
    /// an excluded or `no_retry` request included), `SerializationError` if
    /// the body does not decode into `T`, and the errors of
    /// [`RequestDispatcher::send`].
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> AureaResult<T> {
        let response = self.send(request).await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED && self.expires_session(request) {
            return Err(AureaError::AuthExpired);
        }
        if !status.is_success() {
            return Err(unexpected_status(response).await);
        }
        let body = response.bytes().await.map_err(|err| AureaError::NetworkError {
            url: self.transport.url(&request.path),
            error: format!("reading body failed: {err}"),
        })?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// `true` when a final 401 on `request` means the session was cleared.
    pub(crate) fn expires_session(&self, request: &ApiRequest) -> bool {
        request.retry_on_unauthorized && self.is_intercepted(request)
    }

    fn expire(&self) {
        self.tokens.clear_access_token();
        self.tokens.clear_refresh_token();
    }

    fn is_intercepted(&self, request: &ApiRequest) -> bool {
        let path = request.path_without_query();
        !self.excluded_paths.iter().any(|excluded| excluded == path)
    }

    async fn issue(&self, request: &ApiRequest, bearer: Option<&str>) -> AureaResult<Response> {
        let mut builder = self.transport.req(request.method.clone(), &request.path);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        self.transport.execute(builder).await
    }
}
