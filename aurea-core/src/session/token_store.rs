//! Token persistence across the legacy alias sets.
//!
//! Older builds of the wallet apps read tokens from different keys. Every
//! write goes to the whole alias set of its token class so any reader sees
//! the same value, and every clear removes the whole set.

use std::sync::Arc;

use crate::config::SessionConfig;
use crate::storage::KeyValueStore;

use super::types::is_storable_token;

/// The two token classes the store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived bearer credential.
    Access,
    /// Long-lived credential used only to obtain a new access token.
    Refresh,
}

/// Sole owner of persisted token values.
///
/// Storage failures never escape: they are logged and the store behaves as
/// if nothing were stored, so the session degrades to anonymous.
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
    access_aliases: Vec<String>,
    refresh_aliases: Vec<String>,
}

impl TokenStore {
    /// Creates a token store over `store` using the alias sets in `config`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            access_aliases: config.access_token_aliases.clone(),
            refresh_aliases: config.refresh_token_aliases.clone(),
        }
    }

    /// First stored access token, canonical alias first.
    #[must_use]
    pub fn get_access_token(&self) -> Option<String> {
        self.read(TokenKind::Access)
    }

    /// Writes `token` to every access alias. Returns `false` (and writes
    /// nothing) for empty, `"null"` or `"undefined"` tokens.
    pub fn set_access_token(&self, token: &str) -> bool {
        self.write(TokenKind::Access, token)
    }

    /// Removes the access token from every alias.
    pub fn clear_access_token(&self) {
        self.clear_kind(TokenKind::Access);
    }

    /// First stored refresh token, canonical alias first.
    #[must_use]
    pub fn get_refresh_token(&self) -> Option<String> {
        self.read(TokenKind::Refresh)
    }

    /// Writes `token` to every refresh alias, with the same guard as
    /// [`TokenStore::set_access_token`].
    pub fn set_refresh_token(&self, token: &str) -> bool {
        self.write(TokenKind::Refresh, token)
    }

    /// Removes the refresh token from every alias.
    pub fn clear_refresh_token(&self) {
        self.clear_kind(TokenKind::Refresh);
    }

    /// Removes both token classes.
    pub fn clear(&self) {
        self.clear_access_token();
        self.clear_refresh_token();
    }

    /// The alias set of `kind`, in read priority order.
    #[must_use]
    pub fn aliases(&self, kind: TokenKind) -> &[String] {
        match kind {
            TokenKind::Access => &self.access_aliases,
            TokenKind::Refresh => &self.refresh_aliases,
        }
    }

    fn read(&self, kind: TokenKind) -> Option<String> {
        self.aliases(kind).iter().find_map(|alias| {
            match self.store.get(alias) {
                Ok(value) => value.filter(|token| is_storable_token(token)),
                Err(err) => {
                    log::warn!("token store read of {kind} alias {alias} failed: {err}");
                    None
                }
            }
        })
    }

    fn write(&self, kind: TokenKind, token: &str) -> bool {
        if !is_storable_token(token) {
            log::debug!("ignoring attempt to store an empty {kind} token");
            return false;
        }
        let token = token.trim();
        for alias in self.aliases(kind) {
            if let Err(err) = self.store.set(alias, token) {
                log::warn!("token store write of {kind} alias {alias} failed: {err}");
            }
        }
        true
    }

    fn clear_kind(&self, kind: TokenKind) {
        for alias in self.aliases(kind) {
            if let Err(err) = self.store.remove(alias) {
                log::warn!("token store clear of {kind} alias {alias} failed: {err}");
            }
        }
    }
}
