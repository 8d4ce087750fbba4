//! Idempotency keys for financial mutations.
//!
//! One user intent (one click on "send") gets one key. Every retry or replay
//! of that intent must carry the same key, and a new intent must get a new
//! one; the backend uses the key to return the original result instead of
//! executing the transfer again. The generator cannot enforce that discipline
//! by itself, [`crate::mutation::Mutation`] does it by owning the key.

use std::fmt;

use reqwest::header::HeaderValue;
use uuid::Uuid;

use crate::error::{AureaError, AureaResult};

/// Header the key travels in.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

const FALLBACK_LABEL: &str = "op";

/// Opaque per-intent key, e.g. `pix-send-1760871234567-3f2c...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates a fresh key for a new intent.
    ///
    /// The key is `<label>-<unix millis>-<random>`: the label and timestamp
    /// make it traceable in support logs, the 122 random bits of a v4 UUID
    /// make collisions practically impossible. No state is kept between calls.
    #[must_use]
    pub fn create(intent_label: &str) -> Self {
        let label = sanitize_label(intent_label);
        let millis = chrono::Utc::now().timestamp_millis();
        let random = Uuid::new_v4().simple();
        Self(format!("{label}-{millis}-{random}"))
    }

    /// Rebuilds a key issued earlier, to replay an intent whose outcome is
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or whitespace-only key, or one that
    /// cannot travel in an HTTP header.
    pub fn from_existing(key: impl Into<String>) -> AureaResult<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(AureaError::InvalidInput(
                "idempotency key must not be empty".to_string(),
            ));
        }
        HeaderValue::from_str(trimmed).map_err(|err| {
            AureaError::InvalidInput(format!("idempotency key is not a valid header value: {err}"))
        })?;
        Ok(Self(trimmed.to_string()))
    }

    /// The key as sent in the header.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize_label(label: &str) -> String {
    let label: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if label.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_key_layout() {
        let key = IdempotencyKey::create("pix-send");
        let parts: Vec<&str> = key.as_str().rsplitn(3, '-').collect();
        // rsplitn yields random, millis, label
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 32);
        assert!(parts[0].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(parts[1].parse::<i64>().unwrap() > 0);
        assert_eq!(parts[2], "pix-send");
    }

    #[test]
    fn test_keys_are_unique_per_call() {
        let keys: HashSet<IdempotencyKey> =
            (0..1_000).map(|_| IdempotencyKey::create("pix-send")).collect();
        assert_eq!(keys.len(), 1_000);
    }

    #[test]
    fn test_label_is_sanitized() {
        let key = IdempotencyKey::create("  PIX Send/Tx ");
        assert!(key.as_str().starts_with("pix-send-tx-"));

        let key = IdempotencyKey::create("");
        assert!(key.as_str().starts_with("op-"));
    }

    #[test]
    fn test_from_existing() {
        let key = IdempotencyKey::from_existing(" pix-send-1-abc ").unwrap();
        assert_eq!(key.to_string(), "pix-send-1-abc");
        assert!(IdempotencyKey::from_existing("   ").is_err());
    }

    #[test]
    fn test_from_existing_rejects_header_breaking_keys() {
        for key in ["pix-send-1\nX-Injected: 1", "pix-send-\u{7f}", "pix-send-\r1"] {
            assert!(matches!(
                IdempotencyKey::from_existing(key),
                Err(AureaError::InvalidInput(_))
            ));
        }
    }
}
