//! Persistence primitives underneath the certificate and anchor stores.
//!
//! - **`DataStore<T>`**: keyed records (one per chain id), used for the
//!   rejected and approved collections.
//! - **`BlobStore`**: named byte blobs, used for the serialized anchor set.
//!
//! Both come in an in-memory flavour (tests, ephemeral contexts) and a
//! file-backed flavour rooted at the configured data directory.

pub mod file;
pub mod memory;

pub use file::{FileBlobStore, FileDataStore};
pub use memory::{MemoryBlobStore, MemoryDataStore};

use std::collections::BTreeMap;

use crate::error::{Result, TrustError};

/// Keyed record persistence.
pub trait DataStore<T>: Send + Sync {
    /// Fetch the record stored under `id`.
    fn get(&self, id: &str) -> Result<Option<T>>;

    /// Insert or replace the record stored under `id`.
    fn put(&self, id: &str, item: &T) -> Result<()>;

    /// Delete the record stored under `id`; absent ids are not an error.
    fn remove(&self, id: &str) -> Result<()>;

    /// All records, ordered by id.
    fn get_all(&self) -> Result<BTreeMap<String, T>>;
}

/// Named binary blob persistence.
pub trait BlobStore: Send + Sync {
    /// Read a blob; `None` if it was never written.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Replace a blob's content.
    fn write(&self, name: &str, data: &[u8]) -> Result<()>;
}

/// Ids and blob names end up as file names, so keep them to a safe alphabet.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key.len() <= 128
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        && !key.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(TrustError::InvalidInput(format!("invalid store key: {key:?}")))
    }
}
