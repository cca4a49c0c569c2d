//! Request queue for deferred persistence operations.
//!
//! A bounded FIFO keyed by id. Re-enqueuing an id replaces the old entry, the
//! oldest entry is evicted when the queue is full, and `drain` replays entries
//! until the queue is empty, the network drops, or every failing entry has hit
//! its retry ceiling. Every drain that attempted something publishes its
//! [`DrainReport`] to subscribers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::operation::{DeferredOperation, DrainOutcome, DrainReport, QueuedRequest};
use crate::features::network::{NetworkMonitor, SubscriptionId};

/// Configuration for the request queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of entries held at once.
    pub capacity: usize,
    /// Failed drain attempts allowed before an entry is dropped.
    pub max_retries: u32,
    /// Pause after requeueing a failed entry.
    pub item_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            max_retries: 3,
            item_delay: Duration::from_millis(1000),
        }
    }
}

/// Bounded, de-duplicating FIFO of deferred operations.
pub struct RequestQueue {
    config: QueueConfig,
    entries: Mutex<VecDeque<QueuedRequest>>,
    // Bumped by `clear`; in-flight entries from an older epoch are not requeued
    epoch: AtomicU64,
    draining: AtomicBool,
    network: Option<NetworkMonitor>,
    drained: broadcast::Sender<DrainReport>,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("config", &self.config)
            .field("size", &self.size())
            .field("draining", &self.is_draining())
            .finish_non_exhaustive()
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

/// Resets the draining flag when a drain finishes or is cancelled.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RequestQueue {
    /// Create a queue that drains regardless of connectivity.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        let (drained, _) = broadcast::channel(16);
        Self {
            config,
            entries: Mutex::new(VecDeque::new()),
            epoch: AtomicU64::new(0),
            draining: AtomicBool::new(false),
            network: None,
            drained,
        }
    }

    /// Stop draining whenever `monitor` reports offline.
    #[must_use]
    pub fn with_network(mut self, monitor: NetworkMonitor) -> Self {
        self.network = Some(monitor);
        self
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Subscribe to reports of finished drains.
    #[must_use]
    pub fn subscribe_drained(&self) -> broadcast::Receiver<DrainReport> {
        self.drained.subscribe()
    }

    /// Insert or replace the entry for `id`.
    ///
    /// Returns the id of the entry evicted to make room, if any.
    pub fn enqueue(&self, id: impl Into<String>, operation: DeferredOperation) -> Option<String> {
        let id = id.into();
        let mut entries = self.entries.lock();

        if let Some(pos) = entries.iter().position(|e| e.id == id) {
            entries.remove(pos);
            tracing::debug!(id = %id, "replacing queued request");
        }

        let evicted = self.push_bounded(&mut entries, QueuedRequest::new(id, operation));
        tracing::debug!(size = entries.len(), "request queued");
        evicted
    }

    /// Number of queued entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Queued ids, head first.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.id.clone()).collect()
    }

    /// Whether a drain is in progress.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Remove every entry. Returns how many were discarded.
    ///
    /// An entry that a running drain has in flight is not requeued if it
    /// fails.
    pub fn clear(&self) -> usize {
        self.clear_except(None)
    }

    /// Remove every entry except the one for `keep`. Returns how many were
    /// discarded.
    pub fn clear_except(&self, keep: Option<&str>) -> usize {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let before = entries.len();
        entries.retain(|e| keep.is_some_and(|id| e.id == id));
        let count = before - entries.len();
        if count > 0 {
            tracing::info!(count, kept = entries.len(), "request queue cleared");
        }
        count
    }

    /// Remove the entry for `id`. Returns false if none was queued.
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Replay queued operations.
    ///
    /// Only one drain runs at a time; a concurrent call returns immediately
    /// with `skipped` set.
    pub async fn drain(&self) -> DrainReport {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("drain already in progress");
            return DrainReport {
                skipped: true,
                ..DrainReport::empty()
            };
        };

        let mut report = DrainReport::empty();

        loop {
            if self.network.as_ref().is_some_and(|n| !n.is_online()) {
                tracing::info!(remaining = self.size(), "drain paused, network offline");
                report.interrupted = true;
                break;
            }

            let (next, epoch) = {
                let mut entries = self.entries.lock();
                (entries.pop_front(), self.epoch.load(Ordering::Acquire))
            };
            let Some(mut entry) = next else {
                break;
            };

            let outcome = match entry.run().await {
                Ok(()) => DrainOutcome::Succeeded,
                Err(failure) => {
                    entry.retry_count += 1;
                    self.settle_failure(entry.clone(), epoch, &failure)
                },
            };
            report.add(&entry.id, outcome);

            if outcome == DrainOutcome::Requeued {
                tokio::time::sleep(self.config.item_delay).await;
            }
        }

        if report.attempts() > 0 {
            if report.all_succeeded() {
                tracing::info!(succeeded = report.succeeded, "request queue drained");
            } else {
                tracing::warn!(
                    succeeded = report.succeeded,
                    requeued = report.requeued,
                    dropped = report.dropped,
                    remaining = self.size(),
                    "request queue drained with failures"
                );
            }
            // Nobody listening is fine
            let _ = self.drained.send(report.clone());
        }

        report
    }

    /// Drain automatically every time `monitor` reports the network is back.
    pub fn drain_on_reconnect(self: &Arc<Self>, monitor: &NetworkMonitor) -> SubscriptionId {
        let queue = Arc::clone(self);
        monitor.subscribe(move |status| {
            if !status.online || queue.is_empty() {
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let queue = Arc::clone(&queue);
                    handle.spawn(async move {
                        queue.drain().await;
                    });
                },
                Err(_) => tracing::warn!("network back online but no runtime to drain on"),
            }
        })
    }

    fn settle_failure(
        &self,
        entry: QueuedRequest,
        epoch: u64,
        failure: &crate::error::SyncFailure,
    ) -> DrainOutcome {
        let mut entries = self.entries.lock();
        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::debug!(id = %entry.id, error = %failure, "queue cleared while request was in flight");
            return DrainOutcome::Superseded;
        }

        if entry.retry_count > self.config.max_retries {
            tracing::warn!(
                id = %entry.id,
                retries = entry.retry_count,
                error = %failure,
                "dropping queued request after too many failures"
            );
            return DrainOutcome::Dropped;
        }

        // A newer intent for the same id was queued while this one ran
        if entries.iter().any(|e| e.id == entry.id) {
            return DrainOutcome::Superseded;
        }

        tracing::debug!(id = %entry.id, retries = entry.retry_count, error = %failure, "requeueing");
        self.push_bounded(&mut entries, entry);
        DrainOutcome::Requeued
    }

    fn push_bounded(
        &self,
        entries: &mut VecDeque<QueuedRequest>,
        entry: QueuedRequest,
    ) -> Option<String> {
        let capacity = self.config.capacity.max(1);
        let mut evicted = None;
        while entries.len() >= capacity {
            if let Some(oldest) = entries.pop_front() {
                tracing::warn!(
                    id = %oldest.id,
                    capacity,
                    "request queue full, evicting oldest entry"
                );
                evicted = Some(oldest.id);
            }
        }
        entries.push_back(entry);
        evicted
    }
}
