//! One-time pickup of tokens delivered in the URL fragment.
//!
//! Deep links into the wallet carry the session as `#at=<jwt>&rt=<jwt>`,
//! possibly behind a hash route (`#/pix?at=...`). The bootstrap stores the
//! tokens and rewrites the visible URL without them, without a reload, so
//! they do not linger in history or leak through `Referer`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use url::{form_urlencoded, Url};

use crate::error::{AureaError, AureaResult};

use super::token_store::TokenStore;

/// Fragment parameter carrying the access token.
pub const ACCESS_TOKEN_PARAM: &str = "at";
/// Fragment parameter carrying the refresh token.
pub const REFRESH_TOKEN_PARAM: &str = "rt";
/// Shortest string accepted as a token.
pub const MIN_TOKEN_LEN: usize = 20;

/// The host's address bar (`window.location` + `history.replaceState` in a
/// browser).
pub trait AddressBar: Send + Sync {
    /// The URL currently shown, if the host has one.
    fn current_url(&self) -> Option<String>;

    /// Replaces the shown URL in place, without navigating or reloading.
    fn replace_url(&self, url: &str);
}

/// [`AddressBar`] holding the URL in memory, for non-browser hosts and tests.
#[derive(Debug)]
pub struct MemoryAddressBar {
    url: Mutex<String>,
}

impl MemoryAddressBar {
    /// Starts at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Mutex::new(url.into()),
        }
    }

    /// The URL currently shown.
    #[must_use]
    pub fn url(&self) -> String {
        self.url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AddressBar for MemoryAddressBar {
    fn current_url(&self) -> Option<String> {
        Some(self.url())
    }

    fn replace_url(&self, url: &str) {
        *self.url.lock().unwrap_or_else(PoisonError::into_inner) = url.to_string();
    }
}

/// What a bootstrap run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The bootstrap already ran for this page load.
    AlreadyRan,
    /// The URL carried no access token.
    NoToken,
    /// The access token did not look like a JWT. Nothing was stored.
    Rejected {
        /// Why the token was rejected.
        reason: String,
    },
    /// The access token was stored and removed from the URL.
    Stored {
        /// Whether a refresh token was stored as well.
        refresh_token: bool,
    },
}

/// Checks a candidate token has the shape of a JWT: three non-empty
/// dot-separated segments and at least [`MIN_TOKEN_LEN`] characters.
///
/// # Errors
///
/// Returns [`AureaError::MalformedToken`] describing the mismatch.
pub fn validate_token_shape(token: &str) -> AureaResult<()> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AureaError::MalformedToken {
            reason: format!("expected 3 segments, found {}", segments.len()),
        });
    }
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(AureaError::MalformedToken {
            reason: "empty segment".to_string(),
        });
    }
    if token.len() < MIN_TOKEN_LEN {
        return Err(AureaError::MalformedToken {
            reason: format!("too short ({} < {MIN_TOKEN_LEN})", token.len()),
        });
    }
    Ok(())
}

/// Runs the fragment pickup at most once per instance. Build one per page
/// load.
pub struct SessionBootstrap {
    tokens: Arc<TokenStore>,
    ran: AtomicBool,
}

impl SessionBootstrap {
    /// Creates a bootstrap writing into `tokens`.
    #[must_use]
    pub const fn new(tokens: Arc<TokenStore>) -> Self {
        Self {
            tokens,
            ran: AtomicBool::new(false),
        }
    }

    /// Stores a valid token from the address bar's fragment and strips it
    /// from the visible URL. Invalid or missing tokens leave both the store
    /// and the URL untouched. Never fails.
    pub fn run(&self, address_bar: &dyn AddressBar) -> BootstrapOutcome {
        if self.ran.swap(true, Ordering::SeqCst) {
            return BootstrapOutcome::AlreadyRan;
        }

        let Some(current) = address_bar.current_url() else {
            return BootstrapOutcome::NoToken;
        };
        let Ok(mut url) = Url::parse(&current) else {
            log::debug!("bootstrap skipped: current URL does not parse");
            return BootstrapOutcome::NoToken;
        };
        let Some(fragment) = url.fragment().map(TokenFragment::parse) else {
            return BootstrapOutcome::NoToken;
        };
        let Some(access_token) = fragment.access_token.as_deref() else {
            return BootstrapOutcome::NoToken;
        };

        if let Err(err) = validate_token_shape(access_token) {
            log::warn!("bootstrap ignored the URL access token: {err}");
            return BootstrapOutcome::Rejected {
                reason: err.to_string(),
            };
        }
        if !self.tokens.set_access_token(access_token) {
            return BootstrapOutcome::Rejected {
                reason: "access token is empty".to_string(),
            };
        }

        let refresh_token = match fragment.refresh_token.as_deref() {
            Some(token) => match validate_token_shape(token) {
                Ok(()) => self.tokens.set_refresh_token(token),
                Err(err) => {
                    log::warn!("bootstrap ignored the URL refresh token: {err}");
                    false
                }
            },
            None => false,
        };

        url.set_fragment(fragment.remainder().as_deref());
        address_bar.replace_url(url.as_str());
        log::info!("session bootstrapped from URL fragment (refresh token: {refresh_token})");

        BootstrapOutcome::Stored { refresh_token }
    }
}

/// A URL fragment split into its route and its parameters.
#[derive(Debug, Default, PartialEq, Eq)]
struct TokenFragment {
    route: Option<String>,
    separator: char,
    params: Vec<(String, String)>,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl TokenFragment {
    /// Accepts `at=..&rt=..`, `/route?at=..` and `/route&at=..`.
    fn parse(fragment: &str) -> Self {
        let (route, separator, query) = match fragment.split_once('?') {
            Some((route, query)) => (Some(route), '?', query),
            None => match fragment.split_once('&') {
                Some((head, rest)) if !head.contains('=') => (Some(head), '&', rest),
                _ if !fragment.contains('=') => (Some(fragment), '&', ""),
                _ => (None, '&', fragment),
            },
        };

        let mut parsed = Self {
            route: route.filter(|route| !route.is_empty()).map(String::from),
            separator,
            ..Self::default()
        };
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                ACCESS_TOKEN_PARAM => parsed.access_token = Some(value.into_owned()),
                REFRESH_TOKEN_PARAM => parsed.refresh_token = Some(value.into_owned()),
                _ => parsed.params.push((key.into_owned(), value.into_owned())),
            }
        }
        parsed
    }

    /// The fragment with the token parameters removed, or `None` if nothing
    /// is left.
    fn remainder(&self) -> Option<String> {
        let query = (!self.params.is_empty()).then(|| {
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.params)
                .finish()
        });
        match (&self.route, query) {
            (Some(route), Some(query)) => Some(format!("{route}{}{query}", self.separator)),
            (Some(route), None) => Some(route.clone()),
            (None, Some(query)) => Some(query),
            (None, None) => None,
        }
    }
}
