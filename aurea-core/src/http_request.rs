//! HTTP transport bound to the API base URL.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};

use crate::error::{AureaError, AureaResult};

/// A thin wrapper on an HTTP client bound to one API base URL. Sets sensible
/// defaults such as the per-request timeout and the user-agent.
///
/// The transport never retries on its own: retry policy belongs to the
/// dispatcher (one retry after a refresh) and to mutations (transport
/// failures, same idempotency key).
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Transport {
    /// Initializes a new `Transport` for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("aurea-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.req(Method::POST, path)
    }

    /// Sends a request built by `req`/`post`. Any transport failure (no
    /// response at all) becomes [`AureaError::NetworkError`].
    pub(crate) async fn execute(
        &self,
        request_builder: RequestBuilder,
    ) -> AureaResult<Response> {
        let (client, request) = request_builder.build_split();
        let request = request.map_err(|err| AureaError::InvalidInput(format!(
            "request build failed: {err}"
        )))?;
        let url = request.url().to_string();

        client.execute(request).await.map_err(|err| {
            let error = if err.is_timeout() {
                format!("request timed out: {err}")
            } else if err.is_connect() {
                format!("connect error: {err}")
            } else {
                format!("request failed: {err}")
            };
            log::debug!("transport failure for {url}: {error}");
            AureaError::NetworkError { url, error }
        })
    }
}

/// Length and digest of a response body, for errors and logs. Bodies may
/// carry tokens, so they are never echoed.
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Turns a non-success response into [`AureaError::UnexpectedStatus`].
pub(crate) async fn unexpected_status(response: Response) -> AureaError {
    let url = response.url().to_string();
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let body_summary = summarize_response_body(&body);
    log::warn!("unexpected status {status} from {url} ({body_summary})");
    AureaError::UnexpectedStatus {
        url,
        status,
        body_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let transport = Transport::new("https://api.aurea.gold/", Duration::from_secs(1));
        assert_eq!(
            transport.url("/auth/refresh"),
            "https://api.aurea.gold/auth/refresh"
        );
    }

    #[test]
    fn test_summary_does_not_echo_body() {
        let summary = summarize_response_body(r#"{"access_token":"secret"}"#);
        assert!(summary.starts_with("len=25,digest="));
        assert!(!summary.contains("secret"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = Transport::new(format!("http://{addr}"), Duration::from_secs(2));
        let err = transport
            .execute(transport.req(Method::GET, "/health"))
            .await
            .unwrap_err();
        assert!(err.is_network(), "{err:?}");
    }

    #[tokio::test]
    async fn test_sets_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_header(
                "user-agent",
                mockito::Matcher::Regex("^aurea-core/".to_string()),
            )
            .with_status(204)
            .create_async()
            .await;

        let transport = Transport::new(server.url(), Duration::from_secs(2));
        let response = transport
            .execute(transport.req(Method::GET, "/ping"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 204);
        mock.assert_async().await;
    }
}
