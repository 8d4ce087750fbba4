//! Typed views of the backend's auth responses.
//!
//! Different backend versions answer login and refresh with different field
//! names (`access_token`, `accessToken`, `token`, `jwt`), sometimes wrapped in
//! a `data` envelope. All of that is normalized here so the rest of the crate
//! only sees [`TokenPair`].

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AureaError, AureaResult};

const ACCESS_TOKEN_FIELDS: [&str; 4] = ["access_token", "accessToken", "token", "jwt"];
const REFRESH_TOKEN_FIELDS: [&str; 2] = ["refresh_token", "refreshToken"];
const ENVELOPE_FIELD: &str = "data";

/// Tokens returned by a successful login or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// The new access token.
    pub access_token: String,
    /// A rotated refresh token, when the backend issued one.
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Normalizes a login/refresh response body.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the body is not JSON or carries no
    /// usable access token.
    pub fn from_json(body: &str) -> AureaResult<Self> {
        let value: Value = serde_json::from_str(body)?;
        let access_token = find_token(&value, &ACCESS_TOKEN_FIELDS).ok_or_else(|| {
            AureaError::SerializationError {
                error: "response carries no access token".to_string(),
            }
        })?;
        let refresh_token = find_token(&value, &REFRESH_TOKEN_FIELDS);
        Ok(Self {
            access_token,
            refresh_token,
        })
    }
}

/// Looks `fields` up at the root, then inside the `data` envelope.
pub(crate) fn find_token(value: &Value, fields: &[&str]) -> Option<String> {
    let scopes = [Some(value), value.get(ENVELOPE_FIELD)];
    scopes.into_iter().flatten().find_map(|scope| {
        fields.iter().find_map(|field| {
            scope
                .get(*field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|token| is_storable_token(token))
                .map(String::from)
        })
    })
}

/// `false` for values that are really a stringified absence.
#[must_use]
pub fn is_storable_token(token: &str) -> bool {
    let token = token.trim();
    !(token.is_empty() || token == "null" || token == "undefined")
}

/// Credentials posted to the login endpoint.
#[derive(Debug)]
pub struct LoginCredentials {
    /// Account e-mail.
    pub email: String,
    /// Account password. Redacted from `Debug`.
    pub password: SecretString,
}

impl LoginCredentials {
    /// Builds credentials from an e-mail and a password.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub(crate) fn to_body(&self) -> LoginBody<'_> {
        LoginBody {
            email: &self.email,
            password: self.password.expose_secret(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RefreshBody<'a> {
    pub refresh_token: &'a str,
}
