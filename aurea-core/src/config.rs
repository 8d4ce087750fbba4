//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{AureaError, AureaResult},
    Environment,
};

/// Canonical access-token key, read first.
pub const CANONICAL_ACCESS_TOKEN_KEY: &str = "aurea.access_token";
/// Canonical refresh-token key, read first.
pub const CANONICAL_REFRESH_TOKEN_KEY: &str = "aurea.refresh_token";

/// Keys older builds of the wallet apps read the access token from.
const LEGACY_ACCESS_TOKEN_KEYS: [&str; 3] = ["access_token", "token", "auth_token"];
/// Keys older builds of the wallet apps read the refresh token from.
const LEGACY_REFRESH_TOKEN_KEYS: [&str; 1] = ["refresh_token"];

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Everything the session core needs to know about the backend and the
/// storage layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_url: String,
    /// Path of the login endpoint. Never intercepted by the dispatcher.
    pub login_path: String,
    /// Path of the refresh endpoint. Never intercepted by the dispatcher.
    pub refresh_path: String,
    /// Path of the PIX transfer endpoint.
    pub pix_send_path: String,
    /// Per-request transport timeout, in seconds.
    pub timeout_secs: u64,
    /// Access-token alias set, in read priority order.
    pub access_token_aliases: Vec<String>,
    /// Refresh-token alias set, in read priority order.
    pub refresh_token_aliases: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_environment(&Environment::Production)
    }
}

impl SessionConfig {
    /// Builds the default configuration for `environment`.
    #[must_use]
    pub fn from_environment(environment: &Environment) -> Self {
        let api_url = match environment {
            Environment::Staging => "https://api.stage.aurea.gold",
            Environment::Production => "https://api.aurea.gold",
        };

        Self {
            api_url: api_url.to_string(),
            login_path: "/auth/login".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            pix_send_path: "/pix/send".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            access_token_aliases: std::iter::once(CANONICAL_ACCESS_TOKEN_KEY)
                .chain(LEGACY_ACCESS_TOKEN_KEYS)
                .map(String::from)
                .collect(),
            refresh_token_aliases: std::iter::once(CANONICAL_REFRESH_TOKEN_KEY)
                .chain(LEGACY_REFRESH_TOKEN_KEYS)
                .map(String::from)
                .collect(),
        }
    }

    /// Parses a JSON configuration. Missing fields take production defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the JSON cannot be parsed or the result does
    /// not pass [`SessionConfig::validate`].
    pub fn from_json(json: &str) -> AureaResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| AureaError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy pointing at another API base URL.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns a copy with another transport timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// The transport timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Checks the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> AureaResult<()> {
        let url = url::Url::parse(&self.api_url).map_err(|err| {
            AureaError::InvalidConfig(format!("api_url {:?}: {err}", self.api_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AureaError::InvalidConfig(format!(
                "api_url must be http(s), got {}",
                url.scheme()
            )));
        }

        for (name, path) in [
            ("login_path", &self.login_path),
            ("refresh_path", &self.refresh_path),
            ("pix_send_path", &self.pix_send_path),
        ] {
            if !path.starts_with('/') {
                return Err(AureaError::InvalidConfig(format!(
                    "{name} must start with '/', got {path:?}"
                )));
            }
        }

        if self.timeout_secs == 0 {
            return Err(AureaError::InvalidConfig(
                "timeout_secs must be positive".to_string(),
            ));
        }

        for (name, aliases) in [
            ("access_token_aliases", &self.access_token_aliases),
            ("refresh_token_aliases", &self.refresh_token_aliases),
        ] {
            if aliases.is_empty() || aliases.iter().any(|alias| alias.is_empty()) {
                return Err(AureaError::InvalidConfig(format!(
                    "{name} must be a non-empty list of non-empty keys"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_staging_url() {
        let config = SessionConfig::from_environment(&Environment::Staging);
        assert_eq!(config.api_url, "https://api.stage.aurea.gold");
        config.validate().unwrap();
    }

    #[test]
    fn test_production_url() {
        let config = SessionConfig::from_environment(&Environment::Production);
        assert_eq!(config.api_url, "https://api.aurea.gold");
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!(Environment::from_str("staging").unwrap(), Environment::Staging);
        assert!(Environment::from_str("qa").is_err());
    }

    #[test]
    fn test_canonical_alias_comes_first() {
        let config = SessionConfig::default();
        assert_eq!(config.access_token_aliases[0], CANONICAL_ACCESS_TOKEN_KEY);
        assert_eq!(config.refresh_token_aliases[0], CANONICAL_REFRESH_TOKEN_KEY);
        assert!(config.access_token_aliases.len() > 1);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = SessionConfig::from_json(
            r#"{"api_url": "http://127.0.0.1:8080", "timeout_secs": 3}"#,
        )
        .unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:8080");
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.refresh_path, "/auth/refresh");
    }

    #[test]
    fn test_from_json_rejects_bad_scheme() {
        let err = SessionConfig::from_json(r#"{"api_url": "ftp://example.com"}"#)
            .unwrap_err();
        assert!(matches!(err, AureaError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_empty_alias_set() {
        let mut config = SessionConfig::default();
        config.refresh_token_aliases.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_api_url_trims_trailing_slash() {
        let config = SessionConfig::default().with_api_url("http://localhost:1234/");
        assert_eq!(config.api_url, "http://localhost:1234");
    }
}
