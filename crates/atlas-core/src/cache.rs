//! Persisted lookup cache of resolved availability windows.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::AvailabilityWindow;
use crate::AtlasError;

/// How the resolver treats cached windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Return a cached window when present; otherwise query and store. (Default)
    Use,
    /// Always query the remote store and overwrite the cached window.
    Refresh,
    /// Always query and neither read from nor write to the cache.
    Bypass,
}

impl Default for CacheMode {
    fn default() -> Self {
        Self::Use
    }
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

/// Thread-safe composite-key → window map backed by a JSON file.
#[derive(Debug, Clone)]
pub struct WindowCache {
    inner: Arc<tokio::sync::RwLock<HashMap<String, AvailabilityWindow>>>,
    path: Option<PathBuf>,
}

impl WindowCache {
    /// Cache with no backing file; `flush` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            path: None,
        }
    }

    /// Loads the cache file at `path`. A missing or malformed file yields an
    /// empty cache; the caller never sees a failure.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_entries(&path) {
            Ok(Some(entries)) => {
                debug!(path = %path.display(), entries = entries.len(), "loaded window cache");
                entries
            }
            Ok(None) => {
                debug!(path = %path.display(), "no window cache on disk, starting cold");
                HashMap::new()
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "window cache unreadable, starting cold");
                HashMap::new()
            }
        };

        Self {
            inner: Arc::new(tokio::sync::RwLock::new(entries)),
            path: Some(path),
        }
    }

    /// Reads the cache file, returning `Ok(None)` when it does not exist.
    pub fn read_entries(
        path: &Path,
    ) -> Result<Option<HashMap<String, AvailabilityWindow>>, AtlasError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|error| AtlasError::parse(format!("cache file {}: {error}", path.display())))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self, key: &str) -> Option<AvailabilityWindow> {
        let map = self.inner.read().await;
        map.get(key).copied()
    }

    /// Unconditional overwrite.
    pub async fn put(&self, key: impl Into<String>, window: AvailabilityWindow) {
        let mut map = self.inner.write().await;
        map.insert(key.into(), window);
    }

    pub async fn remove(&self, key: &str) -> Option<AvailabilityWindow> {
        let mut map = self.inner.write().await;
        map.remove(key)
    }

    pub async fn clear(&self) {
        let mut map = self.inner.write().await;
        map.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Sorted copy of every entry.
    pub async fn snapshot(&self) -> BTreeMap<String, AvailabilityWindow> {
        let map = self.inner.read().await;
        map.iter().map(|(key, window)| (key.clone(), *window)).collect()
    }

    /// Writes the whole map to the backing file, replacing it atomically.
    pub async fn flush(&self) -> Result<(), AtlasError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let snapshot = self.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)?;
        crate::table::replace_file(path, json.as_bytes())?;
        debug!(path = %path.display(), entries = snapshot.len(), "flushed window cache");
        Ok(())
    }

    /// Like [`flush`](Self::flush) but only logs failures.
    pub async fn flush_best_effort(&self) {
        if let Err(error) = self.flush().await {
            warn!(%error, "failed to persist window cache");
        }
    }
}
