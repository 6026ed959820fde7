//! File-backed stores rooted at a directory.
//!
//! Every write goes to a uniquely named temp file in the same directory,
//! is synced, and is then renamed into place, so readers see either the
//! old or the new content even with several writers on one data dir.

use std::collections::BTreeMap;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{validate_key, BlobStore, DataStore};
use crate::error::{Result, TrustError};

const RECORD_EXT: &str = "json";

/// One JSON file per record under `<root>/<name>/`.
#[derive(Debug)]
pub struct FileDataStore<T> {
    dir: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FileDataStore<T> {
    /// Open (creating if needed) the collection `name` under `root`.
    pub fn open(root: &Path, name: &str) -> Result<Self> {
        validate_key(name)?;
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| TrustError::io(dir.display().to_string(), e))?;
        Ok(Self {
            dir,
            _marker: PhantomData,
        })
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        validate_key(id)?;
        Ok(self.dir.join(format!("{id}.{RECORD_EXT}")))
    }
}

impl<T: Serialize + DeserializeOwned> FileDataStore<T> {
    fn read_record(path: &Path) -> Result<T> {
        let content =
            std::fs::read(path).map_err(|e| TrustError::io(path.display().to_string(), e))?;
        serde_json::from_slice(&content)
            .map_err(|e| TrustError::Persistence(format!("{}: {e}", path.display())))
    }
}

impl<T: Serialize + DeserializeOwned> DataStore<T> for FileDataStore<T> {
    fn get(&self, id: &str) -> Result<Option<T>> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn put(&self, id: &str, item: &T) -> Result<()> {
        let path = self.record_path(id)?;
        let content = serde_json::to_vec_pretty(item)?;
        write_atomic(&path, &content)
    }

    fn remove(&self, id: &str) -> Result<()> {
        let path = self.record_path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TrustError::io(path.display().to_string(), e)),
        }
    }

    /// Unreadable or corrupt record files are logged and left out, so one
    /// bad file does not hide the rest of the collection.
    fn get_all(&self) -> Result<BTreeMap<String, T>> {
        let dir_str = self.dir.display().to_string();
        let entries = std::fs::read_dir(&self.dir).map_err(|e| TrustError::io(&dir_str, e))?;

        let mut items = BTreeMap::new();
        for entry in entries {
            let path = entry.map_err(|e| TrustError::io(&dir_str, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                debug!(path = %path.display(), "skipping non-utf8 record name");
                continue;
            };
            match Self::read_record(&path) {
                Ok(item) => {
                    items.insert(id.to_string(), item);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        Ok(items)
    }
}

/// Blobs stored as files under `<root>/<name>/`.
#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Open (creating if needed) the blob store `name` under `root`.
    pub fn open(root: &Path, name: &str) -> Result<Self> {
        validate_key(name)?;
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| TrustError::io(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        validate_key(name)?;
        let path = self.dir.join(name);
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TrustError::io(path.display().to_string(), e)),
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_key(name)?;
        write_atomic(&self.dir.join(name), data)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let parent_str = parent.display().to_string();

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| TrustError::io(&parent_str, e))?;
    temp.write_all(data)
        .map_err(|e| TrustError::io(temp.path().display().to_string(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| TrustError::io(temp.path().display().to_string(), e))?;
    temp.persist(path)
        .map_err(|e| TrustError::io(path.display().to_string(), e.error))?;
    Ok(())
}
