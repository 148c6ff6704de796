//! Ways of starting a collection pass from outside the collector.
//!
//! Both backends run the same [`run_pass`]; they differ only in where the work
//! executes and how progress is published.
//!
//! | Backend | Execution | Progress |
//! |---------|-----------|----------|
//! | [`InProcessTrigger`] | task on the current Tokio runtime | [`Collector::status`] |
//! | [`JobRunnerTrigger`] | job handed to a [`JobRunner`] | job metadata via [`JobRunner::state`] |

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::CacheMode;
use crate::collector::Collector;
use crate::staleness::StalenessDetector;
use crate::status::{CollectionStatus, NoopObserver, PassGuard, ProgressObserver};
use crate::table::write_table;
use crate::AtlasError;

/// Result of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub rows: usize,
    pub errors: u64,
    pub table_path: PathBuf,
}

/// Runs a full pass inside `pass`, then writes the table and flushes the cache.
pub async fn run_pass(
    collector: &Collector,
    pass: PassGuard,
    table_path: &Path,
    observer: &dyn ProgressObserver,
) -> Result<PassSummary, AtlasError> {
    let rows = collector.collect_all_in(&pass, observer).await?;
    write_table(table_path, &rows)?;
    collector.cache().flush_best_effort().await;

    let status = pass.snapshot();
    info!(rows = rows.len(), path = %table_path.display(), "wrote result table");
    Ok(PassSummary {
        rows: rows.len(),
        errors: status.errors,
        table_path: table_path.to_path_buf(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    InProcess,
    JobRunner,
}

/// Acknowledgement returned by [`CollectionTrigger::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedJob {
    pub mode: TriggerMode,
    pub job_id: Option<String>,
}

/// Front-end facing contract for starting passes and reading status.
pub trait CollectionTrigger: Send + Sync {
    /// Starts a pass in the background using the collector's cache mode.
    ///
    /// Fails with [`AtlasError::Conflict`] when a pass is already running.
    fn start(&self) -> Result<StartedJob, AtlasError>;

    /// Starts a pass that re-lists every pair and overwrites cached windows.
    fn start_refresh(&self) -> Result<StartedJob, AtlasError>;

    fn status(&self) -> CollectionStatus;
}

fn runtime_handle() -> Result<tokio::runtime::Handle, AtlasError> {
    tokio::runtime::Handle::try_current()
        .map_err(|error| AtlasError::Job(format!("no async runtime available: {error}")))
}

fn join_error(error: tokio::task::JoinError) -> AtlasError {
    AtlasError::Job(format!("collection task aborted: {error}"))
}

/// Runs passes as tasks on the current Tokio runtime.
pub struct InProcessTrigger {
    collector: Collector,
    table_path: PathBuf,
    task: Mutex<Option<JoinHandle<Result<PassSummary, AtlasError>>>>,
}

impl InProcessTrigger {
    pub fn new(collector: Collector, table_path: impl Into<PathBuf>) -> Self {
        Self {
            collector,
            table_path: table_path.into(),
            task: Mutex::new(None),
        }
    }

    /// Waits for the most recently started pass. `None` if nothing was started
    /// or the outcome was already taken.
    pub async fn wait(&self) -> Option<Result<PassSummary, AtlasError>> {
        let handle = self
            .task
            .lock()
            .expect("in-process trigger lock is not poisoned")
            .take()?;
        Some(handle.await.unwrap_or_else(|error| Err(join_error(error))))
    }

    fn launch(&self, collector: Collector) -> Result<StartedJob, AtlasError> {
        let handle = runtime_handle()?;
        let pass = collector.begin()?;

        let cache_mode = collector.cache_mode();
        let table_path = self.table_path.clone();
        let task = handle.spawn(async move {
            let result = run_pass(&collector, pass, &table_path, &NoopObserver).await;
            if let Err(error) = &result {
                warn!(%error, "in-process collection failed");
            }
            result
        });

        *self
            .task
            .lock()
            .expect("in-process trigger lock is not poisoned") = Some(task);
        info!(?cache_mode, "started in-process collection");

        Ok(StartedJob {
            mode: TriggerMode::InProcess,
            job_id: None,
        })
    }
}

impl CollectionTrigger for InProcessTrigger {
    fn start(&self) -> Result<StartedJob, AtlasError> {
        self.launch(self.collector.clone())
    }

    fn start_refresh(&self) -> Result<StartedJob, AtlasError> {
        self.launch(self.collector.with_cache_mode(CacheMode::Refresh))
    }

    fn status(&self) -> CollectionStatus {
        self.collector.status()
    }
}

/// Lifecycle of a job in a [`JobRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Pending,
    Progress,
    Success,
    Failure,
}

/// Task metadata published by a job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub phase: JobPhase,
    pub progress: u64,
    pub total: u64,
    pub summary: Option<PassSummary>,
    pub error: Option<String>,
}

impl JobState {
    fn pending() -> Self {
        Self {
            phase: JobPhase::Pending,
            progress: 0,
            total: 0,
            summary: None,
            error: None,
        }
    }
}

pub type JobFuture = Pin<Box<dyn Future<Output = Result<PassSummary, AtlasError>> + Send>>;

/// Work item handed to a runner; receives the observer that publishes its metadata.
pub type Job = Box<dyn FnOnce(Arc<dyn ProgressObserver>) -> JobFuture + Send>;

/// External job execution backend.
pub trait JobRunner: Send + Sync {
    /// Queues `job` and returns its id.
    fn submit(&self, job: Job) -> Result<String, AtlasError>;

    fn state(&self, job_id: &str) -> Option<JobState>;
}

type JobTable = Arc<Mutex<HashMap<String, JobState>>>;

struct JobMetadataObserver {
    job_id: String,
    jobs: JobTable,
}

impl ProgressObserver for JobMetadataObserver {
    fn on_progress(&self, status: CollectionStatus) {
        let mut jobs = self.jobs.lock().expect("job table lock is not poisoned");
        if let Some(state) = jobs.get_mut(&self.job_id) {
            state.phase = JobPhase::Progress;
            state.progress = status.progress;
            state.total = status.total;
        }
    }
}

/// In-memory job runner executing jobs on the Tokio runtime.
#[derive(Default)]
pub struct LocalJobRunner {
    jobs: JobTable,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl LocalJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for `job_id` to finish and returns its final state.
    pub async fn join(&self, job_id: &str) -> Option<JobState> {
        let handle = self
            .handles
            .lock()
            .expect("job handle lock is not poisoned")
            .remove(job_id);
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                let mut jobs = self.jobs.lock().expect("job table lock is not poisoned");
                if let Some(state) = jobs.get_mut(job_id) {
                    state.phase = JobPhase::Failure;
                    state.error = Some(join_error(error).to_string());
                }
            }
        }
        self.state(job_id)
    }
}

impl JobRunner for LocalJobRunner {
    fn submit(&self, job: Job) -> Result<String, AtlasError> {
        let handle = runtime_handle()?;
        let job_id = uuid::Uuid::new_v4().to_string();

        self.jobs
            .lock()
            .expect("job table lock is not poisoned")
            .insert(job_id.clone(), JobState::pending());

        let observer: Arc<dyn ProgressObserver> = Arc::new(JobMetadataObserver {
            job_id: job_id.clone(),
            jobs: Arc::clone(&self.jobs),
        });
        let jobs = Arc::clone(&self.jobs);
        let id = job_id.clone();
        let task = handle.spawn(async move {
            let outcome = job(observer).await;
            let mut jobs = jobs.lock().expect("job table lock is not poisoned");
            if let Some(state) = jobs.get_mut(&id) {
                match outcome {
                    Ok(summary) => {
                        state.phase = JobPhase::Success;
                        state.summary = Some(summary);
                    }
                    Err(error) => {
                        warn!(job_id = %id, %error, "collection job failed");
                        state.phase = JobPhase::Failure;
                        state.error = Some(error.to_string());
                    }
                }
            }
        });

        self.handles
            .lock()
            .expect("job handle lock is not poisoned")
            .insert(job_id.clone(), task);
        Ok(job_id)
    }

    fn state(&self, job_id: &str) -> Option<JobState> {
        self.jobs
            .lock()
            .expect("job table lock is not poisoned")
            .get(job_id)
            .cloned()
    }
}

/// Submits passes to a [`JobRunner`].
pub struct JobRunnerTrigger {
    collector: Collector,
    table_path: PathBuf,
    runner: Arc<dyn JobRunner>,
}

impl JobRunnerTrigger {
    pub fn new(
        collector: Collector,
        table_path: impl Into<PathBuf>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        Self {
            collector,
            table_path: table_path.into(),
            runner,
        }
    }

    pub fn job_state(&self, job_id: &str) -> Option<JobState> {
        self.runner.state(job_id)
    }

    fn launch(&self, collector: Collector) -> Result<StartedJob, AtlasError> {
        let pass = collector.begin()?;
        let table_path = self.table_path.clone();

        let job: Job = Box::new(move |observer: Arc<dyn ProgressObserver>| -> JobFuture {
            Box::pin(async move { run_pass(&collector, pass, &table_path, observer.as_ref()).await })
        });
        let job_id = self.runner.submit(job)?;
        info!(%job_id, "queued collection job");

        Ok(StartedJob {
            mode: TriggerMode::JobRunner,
            job_id: Some(job_id),
        })
    }
}

impl CollectionTrigger for JobRunnerTrigger {
    fn start(&self) -> Result<StartedJob, AtlasError> {
        self.launch(self.collector.clone())
    }

    fn start_refresh(&self) -> Result<StartedJob, AtlasError> {
        self.launch(self.collector.with_cache_mode(CacheMode::Refresh))
    }

    fn status(&self) -> CollectionStatus {
        self.collector.status()
    }
}

/// Starts a refresh pass only when the staleness check reports new remote data.
///
/// The pass re-lists every pair, since cached windows predate the new data.
/// Returns `Ok(None)` when the table is current.
pub async fn run_if_stale(
    detector: &StalenessDetector,
    trigger: &dyn CollectionTrigger,
) -> Result<Option<StartedJob>, AtlasError> {
    if detector.is_new_data_available().await? {
        info!("new data found, starting refresh collection");
        trigger.start_refresh().map(Some)
    } else {
        info!("no new data");
        Ok(None)
    }
}
