//! Live collection status shared between the collector and its observers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AtlasError;

/// Point-in-time copy of the collector's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStatus {
    pub running: bool,
    pub progress: u64,
    pub total: u64,
    pub errors: u64,
}

impl CollectionStatus {
    pub const fn is_complete(&self) -> bool {
        !self.running && self.progress == self.total
    }
}

/// Lock-free counters updated by concurrently completing resolver tasks.
#[derive(Debug, Default)]
pub struct StatusTracker {
    running: AtomicBool,
    progress: AtomicU64,
    total: AtomicU64,
    errors: AtomicU64,
}

impl StatusTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Starts a pass: resets every counter and marks the tracker running.
    ///
    /// Fails with [`AtlasError::Conflict`] when a pass is already in flight.
    pub fn try_begin(self: &Arc<Self>) -> Result<PassGuard, AtlasError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AtlasError::Conflict)?;

        self.progress.store(0, Ordering::Release);
        self.total.store(0, Ordering::Release);
        self.errors.store(0, Ordering::Release);

        Ok(PassGuard {
            tracker: Arc::clone(self),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CollectionStatus {
        CollectionStatus {
            running: self.running.load(Ordering::Acquire),
            progress: self.progress.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
            errors: self.errors.load(Ordering::Acquire),
        }
    }

    fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Proof that a pass is running. Dropping it clears `running`.
#[derive(Debug)]
pub struct PassGuard {
    tracker: Arc<StatusTracker>,
}

impl PassGuard {
    /// Announces `count` more units of work in this pass.
    pub fn add_total(&self, count: u64) {
        self.tracker.total.fetch_add(count, Ordering::AcqRel);
    }

    pub fn record_completed(&self) {
        self.tracker.progress.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_error(&self) {
        self.tracker.errors.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> CollectionStatus {
        self.tracker.snapshot()
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.tracker.finish();
    }
}

/// Receives a status snapshot each time an instrument completes.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, status: CollectionStatus);
}

/// Observer that ignores every update.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, status: CollectionStatus) {
        let _ = status;
    }
}
