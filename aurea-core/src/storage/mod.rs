//! Persistence seam for session values.
//!
//! The session core only needs a small string key/value store. Browser hosts
//! back it with `localStorage`; native hosts use [`FileStore`]; tests use
//! [`MemoryStore`].

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;
