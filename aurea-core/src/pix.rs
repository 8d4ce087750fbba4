//! PIX transfer client.
//!
//! Transfers are the financial mutation the idempotency machinery exists for:
//! each call to [`PixClient::prepare`] is one user intent with its own key, and
//! [`PixClient::submit`] may be called again with the same [`Mutation`] after
//! an unknown outcome without moving money twice.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AureaError, AureaResult};
use crate::http_request::unexpected_status;
use crate::mutation::{Mutation, MutationPolicy};
use crate::session::{ApiRequest, RequestDispatcher};

const PIX_SEND_LABEL: &str = "pix-send";
const TRANSACTION_ID_FIELDS: [&str; 4] = ["transaction_id", "id", "txid", "end_to_end_id"];
const ENVELOPE_FIELD: &str = "data";

/// A PIX transfer as posted to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixTransfer {
    /// Destination PIX key (CPF, phone, e-mail or random key).
    pub pix_key: String,
    /// Amount in centavos.
    pub amount_cents: u64,
    /// Free-text description shown to the receiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PixTransfer {
    fn validate(&self) -> AureaResult<()> {
        if self.pix_key.trim().is_empty() {
            return Err(AureaError::InvalidInput("pix_key must not be empty".into()));
        }
        if self.amount_cents == 0 {
            return Err(AureaError::InvalidInput(
                "amount_cents must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Normalized answer of the PIX send endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PixReceipt {
    /// Backend transaction identifier.
    pub transaction_id: String,
    /// Backend status label (`completed`, `pending`, ...), if reported.
    pub status: Option<String>,
}

impl PixReceipt {
    fn from_value(value: &Value) -> AureaResult<Self> {
        let scope = value.get(ENVELOPE_FIELD).unwrap_or(value);
        let transaction_id = TRANSACTION_ID_FIELDS
            .iter()
            .find_map(|field| match scope.get(*field) {
                Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => None,
            })
            .ok_or_else(|| AureaError::SerializationError {
                error: "PIX receipt carries no transaction id".to_string(),
            })?;
        let status = scope
            .get("status")
            .and_then(Value::as_str)
            .map(String::from);
        Ok(Self {
            transaction_id,
            status,
        })
    }
}

/// Sends PIX transfers through an authenticated dispatcher.
#[derive(Clone)]
pub struct PixClient {
    dispatcher: RequestDispatcher,
    send_path: String,
    policy: MutationPolicy,
}

impl PixClient {
    /// Creates a client posting to `send_path`.
    #[must_use]
    pub fn new(dispatcher: RequestDispatcher, send_path: impl Into<String>) -> Self {
        Self {
            dispatcher,
            send_path: send_path.into(),
            policy: MutationPolicy::default(),
        }
    }

    /// Replaces the transport retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: MutationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Turns a transfer into a [`Mutation`] with a fresh idempotency key.
    /// Call once per user intent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty key or a zero amount.
    pub fn prepare(&self, transfer: &PixTransfer) -> AureaResult<Mutation> {
        transfer.validate()?;
        let body = serde_json::to_value(transfer)?;
        let request = ApiRequest::post(self.send_path.clone()).json(body);
        Ok(Mutation::new(PIX_SEND_LABEL, request))
    }

    /// Rebuilds the mutation of an earlier intent under its original key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an invalid transfer or an empty key.
    pub fn resume(&self, transfer: &PixTransfer, idempotency_key: &str) -> AureaResult<Mutation> {
        transfer.validate()?;
        let key = crate::idempotency::IdempotencyKey::from_existing(idempotency_key)?;
        let body = serde_json::to_value(transfer)?;
        let request = ApiRequest::post(self.send_path.clone()).json(body);
        Ok(Mutation::with_key(key, request))
    }

    /// Submits (or re-submits) a prepared transfer.
    ///
    /// # Errors
    ///
    /// `AuthExpired` if the session could not be refreshed (it is cleared),
    /// `MutationOutcomeUnknown` if no attempt got a response,
    /// `UnexpectedStatus` for any other non-success status and
    /// `SerializationError` for an unreadable receipt.
    pub async fn submit(&self, mutation: &Mutation) -> AureaResult<PixReceipt> {
        let response = mutation.send(&self.dispatcher, &self.policy).await?;
        let status = response.status();
        let expired = status == StatusCode::UNAUTHORIZED
            && self.dispatcher.expires_session(mutation.request());
        if expired {
            return Err(AureaError::AuthExpired);
        }
        if !status.is_success() {
            return Err(unexpected_status(response).await);
        }

        let body = response.bytes().await.map_err(|err| {
            AureaError::MutationOutcomeUnknown {
                idempotency_key: mutation.key().to_string(),
                error: format!("reading receipt failed: {err}"),
            }
        })?;
        let receipt = PixReceipt::from_value(&serde_json::from_slice(&body)?)?;
        log::info!(
            "PIX transfer {} accepted (key {})",
            receipt.transaction_id,
            mutation.key()
        );
        Ok(receipt)
    }

    /// Prepares and submits a new transfer in one call.
    ///
    /// # Errors
    ///
    /// See [`PixClient::prepare`] and [`PixClient::submit`].
    pub async fn send(&self, transfer: &PixTransfer) -> AureaResult<PixReceipt> {
        let mutation = self.prepare(transfer)?;
        self.submit(&mutation).await
    }
}
