use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheMode, WindowCache};
use crate::domain::{AvailabilityWindow, InstrumentPair};
use crate::listing::{timestamp_dates, ListingClient};
use crate::AtlasError;

/// Resolves availability windows, memoised through a [`WindowCache`].
///
/// With [`CacheMode::Use`] a pair is listed against the remote store at most
/// once for the life of the cache.
#[derive(Clone)]
pub struct WindowResolver {
    listing: Arc<ListingClient>,
    cache: WindowCache,
    mode: CacheMode,
}

impl WindowResolver {
    pub fn new(listing: Arc<ListingClient>, cache: WindowCache) -> Self {
        Self {
            listing,
            cache,
            mode: CacheMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn cache(&self) -> &WindowCache {
        &self.cache
    }

    pub const fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Returns the cached window or lists the pair's objects and stores the result.
    ///
    /// Transport failures are returned as-is; retries already happened in the
    /// listing client.
    pub async fn resolve(&self, pair: &InstrumentPair) -> Result<AvailabilityWindow, AtlasError> {
        let key = pair.cache_key();

        if self.mode.reads() {
            if let Some(window) = self.cache.get(&key).await {
                debug!(%pair, "window cache hit");
                return Ok(window);
            }
        }

        let timestamps = self.listing.list_pair_timestamps(pair).await?;
        let window = AvailabilityWindow::from_dates(timestamp_dates(&timestamps));
        debug!(%pair, %window, objects = timestamps.len(), "resolved window");

        if self.mode.writes() {
            self.cache.put(key, window).await;
        }

        Ok(window)
    }
}
