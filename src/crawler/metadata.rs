//! Entity-tag side table for a mirror directory
//!
//! `metadata.json` maps each mirrored resource URL to the entity tag the
//! origin returned with it:
//!
//! ```json
//! {
//!   "https://example.com/game/css/main.css": { "ETag": "\"abc\"" },
//!   "https://example.com/game/img/bg.png": { "ETag": null }
//! }
//! ```
//!
//! The file is the single source of truth shared by all workers. Every
//! update rereads it, applies one entry and persists it again while holding
//! the store lock, so concurrent updates never lose each other.

use crate::MirrorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;
use url::Url;

/// Stored fingerprint of one mirrored resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
}

/// URL-keyed contents of the side table
pub type MetadataMap = BTreeMap<String, ResourceMetadata>;

/// Lock-guarded access to one mirror's `metadata.json`
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the whole side table
    ///
    /// A missing or unparseable file reads as an empty table.
    pub fn load(&self) -> Result<MetadataMap, MirrorError> {
        let _guard = self.acquire()?;
        Ok(read_map(&self.path))
    }

    /// Returns the stored entity tag for `url`, if any
    pub fn etag_for(&self, url: &Url) -> Result<Option<String>, MirrorError> {
        let _guard = self.acquire()?;
        Ok(read_map(&self.path)
            .remove(url.as_str())
            .and_then(|entry| entry.etag))
    }

    /// Records the entity tag returned with a fresh transfer of `url`
    ///
    /// Rereads the file, replaces the entry for `url` and atomically replaces
    /// the file, all under the store lock. A `None` tag is stored as `null`.
    pub fn record(&self, url: &Url, etag: Option<String>) -> Result<(), MirrorError> {
        let _guard = self.acquire()?;

        let mut map = read_map(&self.path);
        map.insert(url.to_string(), ResourceMetadata { etag });
        write_map(&self.path, &map)?;

        tracing::trace!(url = %url, entries = map.len(), "metadata updated");
        Ok(())
    }

    /// [`etag_for`](Self::etag_for) on the blocking thread pool
    pub async fn load_etag(self: &Arc<Self>, url: &Url) -> Result<Option<String>, MirrorError> {
        let store = Arc::clone(self);
        let url = url.clone();
        tokio::task::spawn_blocking(move || store.etag_for(&url))
            .await
            .map_err(|e| MirrorError::Pool(e.to_string()))?
    }

    /// [`record`](Self::record) on the blocking thread pool
    ///
    /// The file lock and the sync to disk never stall a runtime worker.
    pub async fn store_etag(self: &Arc<Self>, url: &Url, etag: Option<String>) -> Result<(), MirrorError> {
        let store = Arc::clone(self);
        let url = url.clone();
        tokio::task::spawn_blocking(move || store.record(&url, etag))
            .await
            .map_err(|e| MirrorError::Pool(e.to_string()))?
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ()>, MirrorError> {
        self.lock
            .lock()
            .map_err(|_| MirrorError::Metadata("metadata lock poisoned".to_string()))
    }
}

fn read_map(path: &Path) -> MetadataMap {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return MetadataMap::new(),
    };

    match serde_json::from_str(&raw) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "metadata file is corrupt, starting from an empty table"
            );
            MetadataMap::new()
        }
    }
}

fn write_map(path: &Path, map: &MetadataMap) -> Result<(), MirrorError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, map)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| MirrorError::Io(e.error))?;

    Ok(())
}
