//! Discovery orchestration.
//!
//! A pass walks `datatype → instrument → window`. Datatypes are processed one
//! after another. Each instrument of a datatype is resolved on its own Tokio
//! task, with at most `max_workers` tasks alive at once, so listing and XML
//! parsing run in parallel on a multi-threaded runtime.

use std::sync::Arc;

use futures::{stream, StreamExt};
use tracing::{info, warn};

use crate::cache::{CacheMode, WindowCache};
use crate::domain::{sort_rows, AvailabilityWindow, InstrumentPair, InstrumentRow};
use crate::listing::ListingClient;
use crate::resolver::WindowResolver;
use crate::status::{CollectionStatus, NoopObserver, PassGuard, ProgressObserver, StatusTracker};
use crate::AtlasError;

pub const DEFAULT_MAX_WORKERS: usize = 15;

/// Owns the resolver, its cache and the live status for one bucket.
#[derive(Clone)]
pub struct Collector {
    listing: Arc<ListingClient>,
    resolver: WindowResolver,
    status: Arc<StatusTracker>,
    max_workers: usize,
}

impl Collector {
    pub fn new(listing: Arc<ListingClient>, resolver: WindowResolver) -> Self {
        Self {
            listing,
            resolver,
            status: StatusTracker::new(),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Pool size for concurrent window resolution. Zero is treated as one.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Same collector (shared cache and status) resolving in `mode`.
    pub fn with_cache_mode(&self, mode: CacheMode) -> Self {
        Self {
            resolver: self.resolver.clone().with_mode(mode),
            ..self.clone()
        }
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.resolver.mode()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn listing(&self) -> &Arc<ListingClient> {
        &self.listing
    }

    pub fn cache(&self) -> &WindowCache {
        self.resolver.cache()
    }

    pub fn status(&self) -> CollectionStatus {
        self.status.snapshot()
    }

    /// Starts a pass, or fails with [`AtlasError::Conflict`] if one is running.
    pub fn begin(&self) -> Result<PassGuard, AtlasError> {
        self.status.try_begin()
    }

    /// Collects one datatype in its own pass.
    pub async fn collect_one(&self, datatype: &str) -> Result<Vec<InstrumentRow>, AtlasError> {
        let pass = self.begin()?;
        self.collect_one_in(&pass, datatype, &NoopObserver).await
    }

    /// Collects one datatype inside an existing pass.
    ///
    /// Emits exactly one row per listed instrument; a failed resolution becomes
    /// an empty window and bumps the error counter. The cache is flushed once
    /// all instruments are done.
    pub async fn collect_one_in(
        &self,
        pass: &PassGuard,
        datatype: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<InstrumentRow>, AtlasError> {
        let instruments = self.listing.list_instruments(datatype).await?;
        info!(datatype, instruments = instruments.len(), "collecting datatype");

        let rows = self
            .resolve_instruments(pass, datatype, instruments, observer)
            .await;

        self.cache().flush_best_effort().await;
        Ok(rows)
    }

    /// Collects every datatype in its own pass and returns the sorted table.
    pub async fn collect_all(&self) -> Result<Vec<InstrumentRow>, AtlasError> {
        let pass = self.begin()?;
        self.collect_all_in(&pass, &NoopObserver).await
    }

    /// Collects every datatype inside an existing pass.
    ///
    /// A datatype whose instrument listing fails contributes no rows and one
    /// error; only a failure to list the datatypes themselves aborts the pass.
    pub async fn collect_all_in(
        &self,
        pass: &PassGuard,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<InstrumentRow>, AtlasError> {
        let datatypes = self.listing.list_datatypes().await?;
        info!(
            datatypes = datatypes.len(),
            cache_mode = ?self.cache_mode(),
            "starting collection pass"
        );

        let mut rows = Vec::new();
        for datatype in &datatypes {
            match self.collect_one_in(pass, datatype, observer).await {
                Ok(collected) => rows.extend(collected),
                Err(error) => {
                    warn!(datatype = %datatype, %error, "failed to list instruments");
                    pass.record_error();
                    observer.on_progress(pass.snapshot());
                }
            }
        }

        sort_rows(&mut rows);
        let status = pass.snapshot();
        info!(
            rows = rows.len(),
            errors = status.errors,
            "collection pass finished"
        );
        Ok(rows)
    }

    async fn resolve_instruments(
        &self,
        pass: &PassGuard,
        datatype: &str,
        instruments: Vec<String>,
        observer: &dyn ProgressObserver,
    ) -> Vec<InstrumentRow> {
        pass.add_total(instruments.len() as u64);

        // The map closure runs lazily, so a task is only spawned once the
        // buffer has a free slot.
        stream::iter(instruments)
            .map(move |instrument| {
                let pair = InstrumentPair::new(datatype, instrument);
                let resolver = self.resolver.clone();
                let task = {
                    let pair = pair.clone();
                    tokio::spawn(async move { resolver.resolve(&pair).await })
                };

                async move {
                    let window = match task.await {
                        Ok(Ok(window)) => Some(window),
                        Ok(Err(error)) => {
                            warn!(%pair, %error, "window resolution failed");
                            None
                        }
                        Err(error) => {
                            warn!(%pair, %error, "window resolution task aborted");
                            None
                        }
                    };
                    if window.is_none() {
                        pass.record_error();
                    }
                    pass.record_completed();
                    observer.on_progress(pass.snapshot());
                    InstrumentRow::new(pair, window.unwrap_or(AvailabilityWindow::Empty))
                }
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use super::*;
    use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
    use crate::retry::RetryConfig;

    /// Answers `{datatypes}` for the base prefix and `instruments` for any datatype.
    struct TwoLevelClient {
        requests: Mutex<Vec<String>>,
    }

    impl HttpClient for TwoLevelClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests.lock().expect("lock").push(request.url.clone());
            let body = if request.url.ends_with("prefix=d%2F") {
                "<Prefix>d/alpha/</Prefix><Prefix>d/beta/</Prefix>".to_owned()
            } else if request.url.ends_with("prefix=d%2Falpha%2F") {
                "<Prefix>d/alpha/X/</Prefix><Prefix>d/alpha/Y/</Prefix>".to_owned()
            } else if request.url.ends_with("prefix=d%2Fbeta%2F") {
                return Box::pin(async { Ok(HttpResponse::with_status(403, "denied")) });
            } else {
                "<LastModified>2024-01-02T00:00:00Z</LastModified>".to_owned()
            };
            Box::pin(async move { Ok(HttpResponse::ok(body)) })
        }
    }

    fn collector() -> Collector {
        let client = Arc::new(TwoLevelClient {
            requests: Mutex::new(Vec::new()),
        });
        let listing = Arc::new(
            ListingClient::new(client, "https://bucket.example/", "d/")
                .with_retry(RetryConfig::no_retry()),
        );
        let resolver = WindowResolver::new(Arc::clone(&listing), WindowCache::in_memory());
        Collector::new(listing, resolver).with_max_workers(2)
    }

    #[tokio::test]
    async fn unlistable_datatype_counts_as_error_without_aborting() {
        let collector = collector();

        let rows = collector.collect_all().await.expect("pass completes");

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.datatype == "alpha"));
        let status = collector.status();
        assert_eq!(status.errors, 1);
        assert_eq!(status.progress, 2);
        assert!(status.is_complete());
    }

    #[tokio::test]
    async fn collect_one_propagates_instrument_listing_failure_and_clears_running() {
        let collector = collector();

        let error = collector.collect_one("beta").await.expect_err("403");

        assert!(matches!(error, AtlasError::Transport { .. }));
        assert!(!collector.status().running);
    }

    #[tokio::test]
    async fn concurrent_pass_is_rejected() {
        let collector = collector();
        let _pass = collector.begin().expect("first pass");

        assert!(matches!(
            collector.collect_all().await,
            Err(AtlasError::Conflict)
        ));
    }

    #[test]
    fn zero_workers_is_clamped() {
        assert_eq!(collector().with_max_workers(0).max_workers(), 1);
    }

    #[tokio::test]
    async fn cache_mode_override_shares_cache_and_status() {
        let collector = collector();
        let refreshing = collector.with_cache_mode(CacheMode::Refresh);

        assert_eq!(collector.cache_mode(), CacheMode::Use);
        assert_eq!(refreshing.cache_mode(), CacheMode::Refresh);

        let _pass = refreshing.begin().expect("first pass");
        assert!(collector.status().running);

        collector
            .cache()
            .put("alpha-X", AvailabilityWindow::Empty)
            .await;
        assert_eq!(refreshing.cache().len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn resolution_runs_on_spawned_tasks() {
        let collector = collector();

        let rows = tokio::spawn(async move { collector.collect_one("alpha").await })
            .await
            .expect("collection task")
            .expect("alpha lists");

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| !row.window.is_empty()));
    }
}
