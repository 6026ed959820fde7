//! In-memory stores.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::{BlobStore, DataStore};
use crate::error::Result;

/// Keyed records held in a map.
#[derive(Debug)]
pub struct MemoryDataStore<T> {
    items: RwLock<BTreeMap<String, T>>,
}

impl<T> MemoryDataStore<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> Default for MemoryDataStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> DataStore<T> for MemoryDataStore<T> {
    fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.items.read().get(id).cloned())
    }

    fn put(&self, id: &str, item: &T) -> Result<()> {
        self.items.write().insert(id.to_string(), item.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.items.write().remove(id);
        Ok(())
    }

    fn get_all(&self) -> Result<BTreeMap<String, T>> {
        Ok(self.items.read().clone())
    }
}

/// Named blobs held in a map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(name).cloned())
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        self.blobs.write().insert(name.to_string(), data.to_vec());
        Ok(())
    }
}
