//! Session and idempotent-mutation core for Aurea Gold PIX wallet clients.
//!
//! The crate owns the parts of a wallet client that carry real invariants:
//! token persistence under every legacy alias, single-flight refresh of an
//! expired access token, a dispatcher that retries an unauthorized request
//! exactly once, and idempotency keys that keep a retried PIX transfer from
//! executing twice.
//!
//! Everything is reached through a [`session::Session`] built once at start-up:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use aurea_core::config::SessionConfig;
//! use aurea_core::session::{ApiRequest, Session};
//! use aurea_core::storage::MemoryStore;
//! use aurea_core::{AureaResult, Environment};
//!
//! async fn balance() -> AureaResult<serde_json::Value> {
//!     let config = SessionConfig::from_environment(&Environment::Staging);
//!     let session = Session::new(config, Arc::new(MemoryStore::new()))?;
//!     session
//!         .dispatcher()
//!         .send_json(&ApiRequest::get("/pix/balance"))
//!         .await
//! }
//! ```
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
use strum::EnumString;

/// Backend deployment the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Staging backend, for QA builds.
    Staging,
    /// Production backend.
    Production,
}

pub mod config;
pub mod error;
pub mod http_request;
pub mod idempotency;
pub mod logger;
pub mod mutation;
pub mod pix;
pub mod session;
pub mod storage;

pub use error::{AureaError, AureaResult};
pub use idempotency::{IdempotencyKey, IDEMPOTENCY_KEY_HEADER};
pub use session::{Session, SessionState};
