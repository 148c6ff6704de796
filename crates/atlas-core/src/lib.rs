//! # Atlas Core
//!
//! Availability discovery for market-data archives published as an
//! S3-style bucket laid out as `prefix/datatype/instrument/...`.
//!
//! ## Overview
//!
//! For every `(datatype, instrument)` pair under the base prefix, atlas
//! finds the first and last object dates and records them as an
//! availability window. Results land in a CSV table; a JSON lookup cache
//! remembers resolved pairs so later passes skip them.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`http_client`] | HTTP transport abstraction (reqwest / offline) |
//! | [`retry`] | Backoff and retry loop for listing calls |
//! | [`listing`] | Bucket listing queries and XML marker extraction |
//! | [`cache`] | Persisted window cache and cache modes |
//! | [`resolver`] | Cache-backed window resolution for one pair |
//! | [`collector`] | Bounded-concurrency discovery passes |
//! | [`status`] | Live pass counters and progress observers |
//! | [`staleness`] | Reference-pair check for new remote data |
//! | [`table`] | Result table read/write |
//! | [`trigger`] | In-process and job-runner pass triggers |
//! | [`config`] | Defaults, `ATLAS_*` env overrides, wiring |
//! | [`domain`] | Windows, pairs, rows and date helpers |
//! | [`error`] | Core error type |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use atlas_core::{AtlasConfig, AtlasError, write_table};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AtlasError> {
//!     let config = AtlasConfig::from_env()?;
//!     let (collector, detector) = config.build()?;
//!
//!     if detector.is_new_data_available().await? {
//!         let rows = collector.collect_all().await?;
//!         write_table(&config.table_path, &rows)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ CollectionTrigger│───▶│    Collector     │──── StatusTracker
//! └─────────────────┘     └────────┬─────────┘
//!                                  │ buffer_unordered(max_workers)
//!                                  ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  WindowCache    │◀────│  WindowResolver  │
//! └─────────────────┘     └────────┬─────────┘
//!                                  ▼
//!                         ┌──────────────────┐     ┌──────────────┐
//!                         │  ListingClient   │────▶│  HttpClient  │
//!                         └──────────────────┘     └──────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Per-instrument transport failures never abort a pass: the row is kept
//! with an empty window and the status error counter goes up. Cache
//! persistence is best-effort. Starting a pass while one is running fails
//! with [`AtlasError::Conflict`].

pub mod cache;
pub mod collector;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod listing;
pub mod resolver;
pub mod retry;
pub mod staleness;
pub mod status;
pub mod table;
pub mod trigger;

pub use cache::{CacheMode, WindowCache};
pub use collector::{Collector, DEFAULT_MAX_WORKERS};
pub use config::AtlasConfig;
pub use domain::{sort_rows, AvailabilityWindow, InstrumentPair, InstrumentRow};
pub use error::AtlasError;
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};
pub use listing::ListingClient;
pub use resolver::WindowResolver;
pub use retry::{Backoff, RetryConfig};
pub use staleness::{StalenessDetector, StalenessReason, StalenessReport};
pub use status::{CollectionStatus, NoopObserver, PassGuard, ProgressObserver, StatusTracker};
pub use table::{read_table, rows_for_datatype, write_table, TableRecord};
pub use trigger::{
    run_if_stale, run_pass, CollectionTrigger, InProcessTrigger, JobPhase, JobRunner,
    JobRunnerTrigger, JobState, LocalJobRunner, PassSummary, StartedJob, TriggerMode,
};
