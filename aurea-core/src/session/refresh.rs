//! Single-flight exchange of the refresh token for a new access token.
//!
//! At most one exchange is in flight at a time. Callers arriving while it runs
//! await a clone of the same shared future and observe the same outcome. The
//! exchange clears the pending slot itself when it settles, so the next 401
//! can start a fresh attempt. A failed exchange clears both tokens first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::http_request::{summarize_response_body, Transport};

use super::token_store::TokenStore;
use super::types::{RefreshBody, TokenPair};

type PendingRefresh = Shared<BoxFuture<'static, Option<String>>>;

struct RefreshInner {
    tokens: Arc<TokenStore>,
    transport: Arc<Transport>,
    refresh_path: String,
    pending: Mutex<Option<PendingRefresh>>,
    expired: AtomicBool,
}

/// Sole owner of the pending refresh. Cheap to clone; clones share the same
/// pending slot.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

impl RefreshCoordinator {
    /// Creates a coordinator posting to `refresh_path` on `transport`.
    #[must_use]
    pub fn new(
        tokens: Arc<TokenStore>,
        transport: Arc<Transport>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                tokens,
                transport,
                refresh_path: refresh_path.into(),
                pending: Mutex::new(None),
                expired: AtomicBool::new(false),
            }),
        }
    }

    /// Exchanges the stored refresh token for a new access token.
    ///
    /// Resolves to `None` without touching the network when no refresh token
    /// is stored, and to `None` on any failure of the exchange. Never errors
    /// and never retries.
    pub async fn refresh(&self) -> Option<String> {
        self.join_or_start(None).await
    }

    /// Like [`RefreshCoordinator::refresh`], for a caller whose request was
    /// rejected with `rejected`. If the stored access token already differs
    /// from it, another caller finished an exchange in the meantime and the
    /// stored token is returned without a new exchange.
    pub(crate) async fn replace_rejected(&self, rejected: Option<&str>) -> Option<String> {
        self.join_or_start(Some(rejected)).await
    }

    async fn join_or_start(&self, rejected: Option<Option<&str>>) -> Option<String> {
        let pending = {
            let mut slot = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(pending) = slot.as_ref() {
                log::debug!("joining in-flight token refresh");
                pending.clone()
            } else {
                // an exchange stores its token before it frees the slot
                if let Some(rejected) = rejected {
                    let current = self.inner.tokens.get_access_token();
                    if current.is_some() && current.as_deref() != rejected {
                        log::debug!("access token already replaced, skipping refresh");
                        return current;
                    }
                }
                let Some(refresh_token) = self.inner.tokens.get_refresh_token() else {
                    log::debug!("no refresh token stored, skipping refresh");
                    return None;
                };
                let inner = Arc::clone(&self.inner);
                let pending = async move {
                    let outcome = inner.exchange(&refresh_token).await;
                    inner
                        .pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    outcome
                }
                .boxed()
                .shared();
                *slot = Some(pending.clone());
                pending
            }
        };

        pending.await
    }

    /// `true` while an exchange is in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// `true` when the last exchange failed and no token has been stored
    /// through the session since.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.inner.expired.load(Ordering::SeqCst)
    }

    /// Forgets a previous failure, after a login or bootstrap stored fresh
    /// tokens.
    pub(crate) fn reset_expired(&self) {
        self.inner.expired.store(false, Ordering::SeqCst);
    }
}

impl RefreshInner {
    async fn exchange(&self, refresh_token: &str) -> Option<String> {
        let outcome = self.try_exchange(refresh_token).await;
        match &outcome {
            Some(_) => {
                self.expired.store(false, Ordering::SeqCst);
                log::info!("access token refreshed");
            }
            None => {
                // cleared before the slot frees so no caller reuses the rejected token
                self.tokens.clear();
                self.expired.store(true, Ordering::SeqCst);
                log::warn!("access token refresh failed, session cleared");
            }
        }
        outcome
    }

    async fn try_exchange(&self, refresh_token: &str) -> Option<String> {
        let request = self
            .transport
            .post(&self.refresh_path)
            .json(&RefreshBody { refresh_token });

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("refresh request failed: {err}");
                return None;
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                log::warn!("refresh response body unreadable: {err}");
                return None;
            }
        };
        if !status.is_success() {
            log::warn!(
                "refresh rejected with status {status} ({})",
                summarize_response_body(&body)
            );
            return None;
        }

        let pair = match TokenPair::from_json(&body) {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("refresh response malformed: {err}");
                return None;
            }
        };

        if !self.tokens.set_access_token(&pair.access_token) {
            return None;
        }
        if let Some(rotated) = pair.refresh_token.as_deref() {
            self.tokens.set_refresh_token(rotated);
        }
        Some(pair.access_token)
    }
}
