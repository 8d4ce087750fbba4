//! Platform interface for session persistence.

use super::error::StorageResult;

/// Durable string key/value storage scoped to one client origin.
///
/// This is the shape of the browser's `localStorage`: values outlive the
/// process (or page) that wrote them, and every operation may fail when the
/// host disables storage. Callers in the session core treat every error as
/// "nothing stored".
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> StorageResult<()>;
}
