//! Error types of the session core.
//!
//! Only `NetworkError`, `AuthExpired` and `MutationOutcomeUnknown` are meant
//! to reach UI code. Storage and token-shape problems are absorbed and logged
//! where they happen.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type used across `aurea-core`.
pub type AureaResult<T> = Result<T, AureaError>;

/// Error outputs from the session core.
#[derive(Debug, Error)]
pub enum AureaError {
    /// Transport failure: the request never produced a response.
    #[error("network_error: {url}: {error}")]
    NetworkError {
        /// The URL that was being requested.
        url: String,
        /// Description of the transport failure.
        error: String,
    },
    /// The request was still unauthorized after the session tried to refresh,
    /// or the refresh itself failed. The session has been cleared.
    #[error("auth_expired")]
    AuthExpired,
    /// A token delivered out-of-band does not look like a JWT.
    #[error("malformed_token: {reason}")]
    MalformedToken {
        /// Why the token was rejected.
        reason: String,
    },
    /// The persistent store could not be used.
    #[error("storage_unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
    /// The backend answered with a status the caller did not expect.
    #[error("unexpected_status: {status} from {url} ({body_summary})")]
    UnexpectedStatus {
        /// The URL that was requested.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Length and digest of the response body.
        body_summary: String,
    },
    /// The login endpoint rejected the credentials.
    #[error("login_failed: status {status}")]
    LoginFailed {
        /// HTTP status code returned by the login endpoint.
        status: u16,
    },
    /// A mutation could not be confirmed either way. It is safe to replay it
    /// with the same idempotency key.
    #[error("mutation_outcome_unknown: {idempotency_key}: {error}")]
    MutationOutcomeUnknown {
        /// The key the mutation was sent with.
        idempotency_key: String,
        /// The last transport error observed.
        error: String,
    },
    /// Unexpected error serializing or deserializing a payload
    #[error("serialization_error: {error}")]
    SerializationError {
        /// Details of the failure.
        error: String,
    },
    /// The session configuration is not usable.
    #[error("invalid_config: {0}")]
    InvalidConfig(String),
    /// The presented input is not valid for the requested operation
    #[error("invalid_input: {0}")]
    InvalidInput(String),
}

impl AureaError {
    /// Returns `true` for transport failures, the only errors a mutation
    /// retries.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::NetworkError { .. })
    }
}

impl From<serde_json::Error> for AureaError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError {
            error: error.to_string(),
        }
    }
}
