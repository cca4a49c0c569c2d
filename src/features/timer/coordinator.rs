//! Persistence scheduling for the active timer.
//!
//! The coordinator flushes a snapshot of the active timer on a fixed
//! interval, on demand, and at lifecycle edges. Flushes go through the retry
//! executor when online; exhausted retries and offline flushes land in the
//! request queue instead. A final snapshot can be handed to a teardown
//! transport without waiting on the network.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use super::engine::TimerEngine;
use super::slot::TaskSlot;
use super::state::EntitySnapshot;
use crate::error::RetryError;
use crate::features::network::NetworkMonitor;
use crate::features::sync::{deferred, RequestQueue, RetryExecutor};
use crate::remote::{PersistenceClient, TeardownDelivery, TeardownPayload};

/// Configuration for the sync coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Period between automatic flushes while a timer is active.
    pub interval: Duration,
    /// Endpoint name passed to the teardown transport.
    pub teardown_endpoint: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            teardown_endpoint: "snapshots".to_string(),
        }
    }
}

/// Where a flushed snapshot ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushOutcome {
    /// The store confirmed the write.
    Persisted,
    /// The snapshot was deferred to the request queue.
    Queued,
    /// The snapshot was given to the teardown transport.
    HandedOff,
    /// No timer was active.
    Idle,
}

impl std::fmt::Display for FlushOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persisted => write!(f, "persisted"),
            Self::Queued => write!(f, "queued"),
            Self::HandedOff => write!(f, "handed off"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

/// Notifications about flush results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A snapshot reached the store.
    Flushed {
        /// Entity id.
        entity_id: String,
        /// Value written.
        elapsed_seconds: u64,
    },
    /// A snapshot was deferred to the request queue.
    Queued {
        /// Entity id.
        entity_id: String,
        /// Why it was deferred.
        reason: String,
    },
    /// A snapshot was rejected with a terminal failure.
    Failed {
        /// Entity id.
        entity_id: String,
        /// Failure description.
        error: String,
    },
}

/// Queue key for snapshots of `entity_id`.
#[must_use]
pub fn queue_key(entity_id: &str) -> String {
    format!("snapshot:{entity_id}")
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    engine: TimerEngine,
    client: Arc<dyn PersistenceClient>,
    executor: RetryExecutor,
    queue: Arc<RequestQueue>,
    network: NetworkMonitor,
    teardown: Arc<dyn TeardownDelivery>,
    periodic: Mutex<TaskSlot>,
    events: broadcast::Sender<SyncEvent>,
}

/// Decides when snapshots of the active timer are persisted.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config", &self.inner.config)
            .field("executor", &self.inner.executor)
            .field("queue", &self.inner.queue)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Wire a coordinator to its collaborators.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        engine: TimerEngine,
        client: Arc<dyn PersistenceClient>,
        executor: RetryExecutor,
        queue: Arc<RequestQueue>,
        network: NetworkMonitor,
        teardown: Arc<dyn TeardownDelivery>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                engine,
                client,
                executor,
                queue,
                network,
                teardown,
                periodic: Mutex::new(TaskSlot::new()),
                events,
            }),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Subscribe to flush notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// (Re)start the periodic flush task. Must be called from within a tokio
    /// runtime.
    pub fn schedule_periodic(&self) {
        let coordinator = Arc::downgrade(&self.inner);
        let period = self.inner.config.interval;
        self.inner
            .periodic
            .lock()
            .replace_with(|| tokio::spawn(periodic_loop(coordinator, period)));
    }

    /// Cancel the periodic flush task. Returns true if one was scheduled.
    pub fn cancel_periodic(&self) -> bool {
        self.inner.periodic.lock().cancel()
    }

    /// Whether the periodic flush task is scheduled.
    #[must_use]
    pub fn is_periodic_scheduled(&self) -> bool {
        self.inner.periodic.lock().is_active()
    }

    /// Flush the active timer, if any.
    ///
    /// # Errors
    ///
    /// Returns the executor's error when the store rejects the snapshot with
    /// a terminal or authentication failure.
    pub async fn flush_active(&self) -> Result<FlushOutcome, RetryError> {
        match self.inner.engine.snapshot() {
            Some(snapshot) => self.flush_snapshot(snapshot).await,
            None => Ok(FlushOutcome::Idle),
        }
    }

    /// Flush immediately and restart the periodic schedule.
    ///
    /// # Errors
    ///
    /// See [`SyncCoordinator::flush_active`].
    pub async fn flush_now(&self) -> Result<FlushOutcome, RetryError> {
        self.cancel_periodic();
        let result = self.flush_active().await;
        if self.inner.engine.is_active() {
            self.schedule_periodic();
        }
        result
    }

    /// Persist one snapshot.
    ///
    /// Offline snapshots go straight to the queue. Online snapshots go
    /// through the retry executor and fall back to the queue when retries are
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns the executor's error for terminal and authentication failures.
    pub async fn flush_snapshot(&self, snapshot: EntitySnapshot) -> Result<FlushOutcome, RetryError> {
        if !self.inner.network.is_online() {
            self.defer(snapshot, "offline");
            return Ok(FlushOutcome::Queued);
        }

        let client = &self.inner.client;
        let pending = &snapshot;
        let result = self
            .inner
            .executor
            .execute(move || client.persist_entity_snapshot(&pending.entity_id, &pending.fields))
            .await;

        match result {
            Ok(()) => {
                let entity_id = snapshot.entity_id;
                // Anything older for this entity is now stale
                self.inner.queue.remove(&queue_key(&entity_id));
                self.inner.engine.record_persisted(&entity_id, Utc::now());
                tracing::debug!(entity = %entity_id, elapsed = snapshot.fields.elapsed_seconds, "snapshot persisted");
                self.emit(SyncEvent::Flushed {
                    entity_id,
                    elapsed_seconds: snapshot.fields.elapsed_seconds,
                });
                Ok(FlushOutcome::Persisted)
            },
            Err(e) if e.is_exhausted() => {
                self.defer(snapshot, &e.to_string());
                Ok(FlushOutcome::Queued)
            },
            Err(e) => {
                tracing::error!(entity = %snapshot.entity_id, error = %e, "snapshot rejected");
                self.emit(SyncEvent::Failed {
                    entity_id: snapshot.entity_id,
                    error: e.to_string(),
                });
                Err(e)
            },
        }
    }

    /// Hand a final snapshot to the teardown transport.
    ///
    /// Cancels the periodic task first. Returns true if there was nothing to
    /// deliver or the transport accepted the payload.
    pub fn teardown(&self, snapshot: Option<EntitySnapshot>) -> bool {
        self.cancel_periodic();

        let Some(snapshot) = snapshot else {
            return true;
        };

        let pending = self.inner.queue.size();
        if pending > 0 {
            tracing::warn!(pending, "queued requests not delivered before teardown");
        }
        self.hand_off(snapshot)
    }

    /// Give one snapshot to the teardown transport without touching the
    /// periodic schedule. Returns true if the transport accepted it.
    pub fn hand_off(&self, snapshot: EntitySnapshot) -> bool {
        let payload = TeardownPayload::from(snapshot);
        let body = match payload.to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode teardown payload");
                return false;
            },
        };

        let accepted = self
            .inner
            .teardown
            .send(&self.inner.config.teardown_endpoint, &body);
        if accepted {
            tracing::info!(entity = %payload.entity_id, "teardown snapshot handed off");
        } else {
            tracing::warn!(entity = %payload.entity_id, "teardown transport refused snapshot");
        }
        accepted
    }

    fn defer(&self, snapshot: EntitySnapshot, reason: &str) {
        let entity_id = snapshot.entity_id.clone();
        let client = Arc::clone(&self.inner.client);
        let engine = self.inner.engine.clone();
        let snapshot = Arc::new(snapshot);

        let operation = deferred(move || {
            let client = Arc::clone(&client);
            let engine = engine.clone();
            let snapshot = Arc::clone(&snapshot);
            async move {
                client
                    .persist_entity_snapshot(&snapshot.entity_id, &snapshot.fields)
                    .await?;
                engine.record_persisted(&snapshot.entity_id, Utc::now());
                Ok(())
            }
        });

        self.inner.queue.enqueue(queue_key(&entity_id), operation);
        tracing::info!(entity = %entity_id, reason, "snapshot queued for later delivery");
        self.emit(SyncEvent::Queued {
            entity_id,
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.inner.events.send(event);
    }
}

async fn periodic_loop(coordinator: Weak<CoordinatorInner>, period: Duration) {
    loop {
        tokio::time::sleep(period).await;
        let Some(inner) = coordinator.upgrade() else {
            break;
        };
        if !inner.engine.is_active() {
            break;
        }
        let coordinator = SyncCoordinator { inner };
        if let Err(e) = coordinator.flush_active().await {
            tracing::error!(error = %e, "periodic flush failed");
        }
    }
}
