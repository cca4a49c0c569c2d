//! Deferred operations held by the request queue.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

use crate::error::SyncFailure;

/// A re-invocable async operation.
///
/// Each call produces a fresh future, so the same operation can be attempted
/// again after a failure.
pub type DeferredOperation =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(), SyncFailure>> + Send + Sync>;

/// Wrap a closure producing futures into a [`DeferredOperation`].
pub fn deferred<F, Fut>(f: F) -> DeferredOperation
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SyncFailure>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// An operation waiting in the request queue.
#[derive(Clone)]
pub struct QueuedRequest {
    /// De-duplication key; at most one entry per id.
    pub id: String,
    /// The operation to run on drain.
    pub operation: DeferredOperation,
    /// When the entry was (re-)enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Failed drain attempts so far.
    pub retry_count: u32,
}

impl QueuedRequest {
    /// Create a fresh entry.
    #[must_use]
    pub fn new(id: String, operation: DeferredOperation) -> Self {
        Self {
            id,
            operation,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }

    /// Invoke the operation once.
    pub async fn run(&self) -> Result<(), SyncFailure> {
        (self.operation)().await
    }
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("enqueued_at", &self.enqueued_at)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

/// What happened to one entry during a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The operation succeeded and the entry was discarded.
    Succeeded,
    /// The operation failed and the entry went back to the tail.
    Requeued,
    /// The operation failed past the retry ceiling and was dropped.
    Dropped,
    /// The operation failed but a newer entry with the same id, or a clear of
    /// the queue, superseded it.
    Superseded,
}

/// Result of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Number of successful operations
    pub succeeded: usize,
    /// Number of failed attempts that were requeued
    pub requeued: usize,
    /// Number of entries dropped after the retry ceiling
    pub dropped: usize,
    /// Number of failures discarded in favor of a newer entry
    pub superseded: usize,
    /// True if the drain stopped because the network went offline
    pub interrupted: bool,
    /// True if another drain was already running and this call did nothing
    pub skipped: bool,
    /// Ids of dropped entries
    pub dropped_ids: Vec<String>,
}

impl DrainReport {
    /// Create an empty report.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            succeeded: 0,
            requeued: 0,
            dropped: 0,
            superseded: 0,
            interrupted: false,
            skipped: false,
            dropped_ids: Vec::new(),
        }
    }

    /// Record the outcome for one entry.
    pub fn add(&mut self, id: &str, outcome: DrainOutcome) {
        match outcome {
            DrainOutcome::Succeeded => self.succeeded += 1,
            DrainOutcome::Requeued => self.requeued += 1,
            DrainOutcome::Superseded => self.superseded += 1,
            DrainOutcome::Dropped => {
                self.dropped += 1;
                self.dropped_ids.push(id.to_string());
            },
        }
    }

    /// Total attempts made during the drain.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.succeeded + self.requeued + self.dropped + self.superseded
    }

    /// True if every attempted entry was delivered.
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.dropped == 0 && self.requeued == 0
    }
}
