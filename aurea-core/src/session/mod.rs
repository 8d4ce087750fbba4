//! Session lifecycle: token storage, deep-link bootstrap, single-flight refresh
//! and authenticated dispatch.
//!
//! A [`Session`] is built once per application start and handed to whatever
//! needs to talk to the API. It owns one instance of each component, so the
//! single-flight guarantee holds across every caller sharing it.

pub mod bootstrap;
pub mod dispatcher;
pub mod refresh;
pub mod token_store;
pub mod types;

use std::sync::Arc;

use serde::Serialize;

pub use bootstrap::{
    validate_token_shape, AddressBar, BootstrapOutcome, MemoryAddressBar, SessionBootstrap,
};
pub use dispatcher::{ApiRequest, RequestDispatcher};
pub use refresh::RefreshCoordinator;
pub use token_store::{TokenKind, TokenStore};
pub use types::{LoginCredentials, TokenPair};

use crate::config::SessionConfig;
use crate::error::{AureaError, AureaResult};
use crate::http_request::{summarize_response_body, Transport};
use crate::pix::PixClient;
use crate::storage::KeyValueStore;

/// Where the session stands. Derived on every call, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// No access token stored.
    Anonymous,
    /// An access token is stored.
    Authenticated,
    /// A refresh exchange is in flight.
    Refreshing,
    /// The last refresh failed; the user has to sign in again.
    Expired,
}

/// The session root: one token store, one refresh coordinator, one dispatcher
/// and one bootstrap, sharing state.
pub struct Session {
    config: SessionConfig,
    tokens: Arc<TokenStore>,
    transport: Arc<Transport>,
    refresher: RefreshCoordinator,
    dispatcher: RequestDispatcher,
    bootstrap: SessionBootstrap,
}

impl Session {
    /// Builds a session over `store`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` does not validate.
    pub fn new(config: SessionConfig, store: Arc<dyn KeyValueStore>) -> AureaResult<Self> {
        config.validate()?;

        let tokens = Arc::new(TokenStore::new(store, &config));
        let transport = Arc::new(Transport::new(config.api_url.clone(), config.timeout()));
        let refresher = RefreshCoordinator::new(
            Arc::clone(&tokens),
            Arc::clone(&transport),
            config.refresh_path.clone(),
        );
        let dispatcher = RequestDispatcher::new(
            Arc::clone(&tokens),
            refresher.clone(),
            Arc::clone(&transport),
            vec![config.login_path.clone(), config.refresh_path.clone()],
        );
        let bootstrap = SessionBootstrap::new(Arc::clone(&tokens));

        Ok(Self {
            config,
            tokens,
            transport,
            refresher,
            dispatcher,
            bootstrap,
        })
    }

    /// The configuration the session was built with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The current [`SessionState`].
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.refresher.is_refreshing() {
            SessionState::Refreshing
        } else if self.tokens.get_access_token().is_some() {
            SessionState::Authenticated
        } else if self.refresher.is_expired() {
            SessionState::Expired
        } else {
            SessionState::Anonymous
        }
    }

    /// The token store.
    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// The authenticated dispatcher. Clones share this session's state.
    #[must_use]
    pub const fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Exchanges the refresh token now. See [`RefreshCoordinator::refresh`].
    pub async fn refresh(&self) -> Option<String> {
        self.refresher.refresh().await
    }

    /// Picks up a token delivered in the URL fragment. Runs at most once per
    /// session.
    pub fn bootstrap(&self, address_bar: &dyn AddressBar) -> BootstrapOutcome {
        let outcome = self.bootstrap.run(address_bar);
        if matches!(outcome, BootstrapOutcome::Stored { .. }) {
            self.refresher.reset_expired();
        }
        outcome
    }

    /// Signs in and stores the returned tokens.
    ///
    /// # Errors
    ///
    /// `LoginFailed` for a non-success status, `SerializationError` if the
    /// response carries no access token, `NetworkError` on transport failure.
    pub async fn login(&self, credentials: &LoginCredentials) -> AureaResult<()> {
        let request = self
            .transport
            .post(&self.config.login_path)
            .json(&credentials.to_body());
        let response = self.transport.execute(request).await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AureaError::NetworkError {
                url: self.transport.url(&self.config.login_path),
                error: format!("reading body failed: {err}"),
            })?;
        if !status.is_success() {
            log::warn!(
                "login rejected with status {status} ({})",
                summarize_response_body(&body)
            );
            return Err(AureaError::LoginFailed {
                status: status.as_u16(),
            });
        }

        let pair = TokenPair::from_json(&body)?;
        if !self.tokens.set_access_token(&pair.access_token) {
            return Err(AureaError::SerializationError {
                error: "login returned an empty access token".to_string(),
            });
        }
        // a login without a refresh token must not keep the previous user's
        match pair.refresh_token.as_deref() {
            Some(refresh_token) => {
                self.tokens.set_refresh_token(refresh_token);
            }
            None => self.tokens.clear_refresh_token(),
        }
        self.refresher.reset_expired();
        log::info!("signed in as {}", credentials.email);
        Ok(())
    }

    /// Clears both token classes.
    pub fn logout(&self) {
        self.tokens.clear();
        self.refresher.reset_expired();
        log::info!("signed out");
    }

    /// A PIX client sending through this session's dispatcher.
    #[must_use]
    pub fn pix(&self) -> PixClient {
        PixClient::new(self.dispatcher.clone(), self.config.pix_send_path.clone())
    }
}
