//! Host-facing facade over the timer engine and sync coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};

use super::coordinator::{
    queue_key, CoordinatorConfig, FlushOutcome, SyncCoordinator, SyncEvent,
};
use super::engine::{StartOutcome, TimerCompleted, TimerEngine};
use super::slot::TaskSlot;
use super::state::{EntitySnapshot, TimerMode};
use crate::error::TickvaultError;
use crate::features::network::{
    ConnectivitySignal, NetworkMonitor, NetworkStatus, SubscriptionId,
};
use crate::features::sync::{DrainReport, QueueConfig, RequestQueue, RetryExecutor};
use crate::remote::{PersistenceClient, TeardownDelivery};

type LastKnown = Arc<Mutex<HashMap<String, u64>>>;
type SignalStream = futures::stream::BoxStream<'static, ConnectivitySignal>;

/// Builder for [`TimerService`].
pub struct TimerServiceBuilder {
    client: Arc<dyn PersistenceClient>,
    teardown: Arc<dyn TeardownDelivery>,
    executor: RetryExecutor,
    queue: QueueConfig,
    coordinator: CoordinatorConfig,
    network: Option<NetworkMonitor>,
    signals: Option<SignalStream>,
    tick_interval: Duration,
}

impl TimerServiceBuilder {
    /// Start a builder with default configuration.
    #[must_use]
    pub fn new(client: Arc<dyn PersistenceClient>, teardown: Arc<dyn TeardownDelivery>) -> Self {
        Self {
            client,
            teardown,
            executor: RetryExecutor::default(),
            queue: QueueConfig::default(),
            coordinator: CoordinatorConfig::default(),
            network: None,
            signals: None,
            tick_interval: Duration::from_secs(1),
        }
    }

    /// Use a configured retry executor.
    #[must_use]
    pub fn executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Set the request queue configuration.
    #[must_use]
    pub fn queue_config(mut self, config: QueueConfig) -> Self {
        self.queue = config;
        self
    }

    /// Set the coordinator configuration.
    #[must_use]
    pub fn coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.coordinator = config;
        self
    }

    /// Share an existing network monitor.
    #[must_use]
    pub fn network(mut self, monitor: NetworkMonitor) -> Self {
        self.network = Some(monitor);
        self
    }

    /// Feed platform connectivity signals into the network monitor for as
    /// long as the service lives.
    #[must_use]
    pub fn connectivity<S>(mut self, signals: S) -> Self
    where
        S: Stream<Item = ConnectivitySignal> + Send + 'static,
    {
        let signals: SignalStream = Box::pin(signals);
        self.signals = Some(signals);
        self
    }

    /// Set the tick period.
    #[must_use]
    pub const fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Wire everything together and start the background watchers.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn build(self) -> TimerService {
        let network = self.network.unwrap_or_default();
        let engine = TimerEngine::with_tick_interval(self.tick_interval);
        let queue = Arc::new(RequestQueue::new(self.queue).with_network(network.clone()));
        let reconnect = queue.drain_on_reconnect(&network);

        let coordinator = SyncCoordinator::new(
            self.coordinator,
            engine.clone(),
            self.client,
            self.executor,
            Arc::clone(&queue),
            network.clone(),
            self.teardown,
        );

        let last_known = LastKnown::default();
        let mut watcher = TaskSlot::new();
        let completed = engine.subscribe_completed();
        let (watched, known) = (coordinator.clone(), Arc::clone(&last_known));
        watcher.replace_with(|| tokio::spawn(watch_completions(completed, watched, known)));

        let mut follower = TaskSlot::new();
        if let Some(signals) = self.signals {
            let monitor = network.clone();
            follower.replace_with(|| tokio::spawn(async move { monitor.follow(signals).await }));
        }

        TimerService {
            engine,
            coordinator,
            queue,
            network,
            last_known,
            _watcher: watcher,
            _follower: follower,
            reconnect,
        }
    }
}

/// The single active timer plus everything that keeps it durable.
pub struct TimerService {
    engine: TimerEngine,
    coordinator: SyncCoordinator,
    queue: Arc<RequestQueue>,
    network: NetworkMonitor,
    last_known: LastKnown,
    _watcher: TaskSlot,
    _follower: TaskSlot,
    reconnect: SubscriptionId,
}

impl std::fmt::Debug for TimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerService")
            .field("engine", &self.engine)
            .field("coordinator", &self.coordinator)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.network.unsubscribe(self.reconnect);
    }
}

impl TimerService {
    /// Start a builder.
    #[must_use]
    pub fn builder(
        client: Arc<dyn PersistenceClient>,
        teardown: Arc<dyn TeardownDelivery>,
    ) -> TimerServiceBuilder {
        TimerServiceBuilder::new(client, teardown)
    }

    /// Start timing `entity_id`.
    ///
    /// A different entity that was active is stopped and given a final
    /// flush; a failure of that flush is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`TickvaultError::InvalidEntity`] for a blank id. The timer is
    /// idle afterwards.
    pub async fn start_timer(
        &self,
        entity_id: &str,
        mode: TimerMode,
    ) -> Result<StartOutcome, TickvaultError> {
        let outcome = self.engine.start(entity_id, mode);
        match &outcome {
            StartOutcome::Started { previous } => {
                self.coordinator.schedule_periodic();
                if let Some(prev) = previous {
                    self.remember(&prev.entity_id, prev.elapsed_seconds);
                    if let Err(e) = self.coordinator.flush_snapshot(prev.snapshot(false)).await {
                        tracing::error!(entity = %prev.entity_id, error = %e, "final flush of replaced timer failed");
                    }
                }
            },
            StartOutcome::Resumed => self.coordinator.schedule_periodic(),
            StartOutcome::Rejected => {
                self.coordinator.cancel_periodic();
                return Err(TickvaultError::InvalidEntity(
                    "entity id must not be empty".to_string(),
                ));
            },
        }
        Ok(outcome)
    }

    /// Stop `entity_id` and flush its final value once.
    ///
    /// Returns [`FlushOutcome::Idle`] without side effects if `entity_id` is
    /// not the active entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the final snapshot terminally.
    pub async fn stop_timer(&self, entity_id: &str) -> Result<FlushOutcome, TickvaultError> {
        let Some(state) = self.engine.stop_entity(entity_id) else {
            tracing::debug!(entity = entity_id, "stop ignored, timer not active");
            return Ok(FlushOutcome::Idle);
        };
        self.coordinator.cancel_periodic();
        self.remember(&state.entity_id, state.elapsed_seconds);
        Ok(self.coordinator.flush_snapshot(state.snapshot(false)).await?)
    }

    /// Current value for `entity_id`: live if active, else the last value
    /// this service saw.
    #[must_use]
    pub fn get_elapsed(&self, entity_id: &str) -> Option<u64> {
        self.engine
            .elapsed(entity_id)
            .or_else(|| self.last_known.lock().get(entity_id).copied())
    }

    /// Snapshot of the active timer.
    #[must_use]
    pub fn active(&self) -> Option<EntitySnapshot> {
        self.engine.snapshot()
    }

    /// Subscribe to countdown completions.
    #[must_use]
    pub fn on_timer_completed(&self) -> broadcast::Receiver<TimerCompleted> {
        self.engine.subscribe_completed()
    }

    /// Subscribe to flush results.
    #[must_use]
    pub fn sync_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.coordinator.subscribe()
    }

    /// Subscribe to reports of finished queue drains, including the ones
    /// started by a reconnect.
    #[must_use]
    pub fn on_queue_drained(&self) -> broadcast::Receiver<DrainReport> {
        self.queue.subscribe_drained()
    }

    /// Flush the active timer now and restart the periodic schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the snapshot terminally.
    pub async fn flush_now(&self) -> Result<FlushOutcome, TickvaultError> {
        Ok(self.coordinator.flush_now().await?)
    }

    /// Forget `entity_id`, flushing it first if it is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails terminally. The entity is
    /// forgotten either way.
    pub async fn delete_entity(&self, entity_id: &str) -> Result<FlushOutcome, TickvaultError> {
        let result = self.stop_timer(entity_id).await;
        self.last_known.lock().remove(entity_id);
        result
    }

    /// Flush, stop everything and discard queued work.
    ///
    /// A final snapshot that cannot reach the store right away is handed to
    /// the teardown transport. If the transport refuses it, its queue entry
    /// is the only one kept and [`FlushOutcome::Queued`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails terminally. State is cleared
    /// either way.
    pub async fn logout(&self) -> Result<FlushOutcome, TickvaultError> {
        self.coordinator.cancel_periodic();
        let mut keep = None;
        let flushed = match self.engine.stop() {
            Some(state) => {
                let snapshot = state.snapshot(false);
                match self.coordinator.flush_snapshot(snapshot.clone()).await {
                    Ok(FlushOutcome::Queued) => {
                        let key = queue_key(&snapshot.entity_id);
                        if self.coordinator.hand_off(snapshot) {
                            self.queue.remove(&key);
                            Ok(FlushOutcome::HandedOff)
                        } else {
                            keep = Some(key);
                            Ok(FlushOutcome::Queued)
                        }
                    },
                    other => other,
                }
            },
            None => Ok(FlushOutcome::Idle),
        };
        let discarded = self.queue.clear_except(keep.as_deref());
        self.last_known.lock().clear();
        tracing::info!(discarded, "session cleared");
        Ok(flushed?)
    }

    /// Cancel all scheduled work and hand the last snapshot to the teardown
    /// transport without waiting on the network.
    ///
    /// Returns false if a snapshot existed and the transport refused it.
    pub fn teardown(&self) -> bool {
        let last = self.engine.stop().map(|state| {
            self.remember(&state.entity_id, state.elapsed_seconds);
            state.snapshot(false)
        });
        self.coordinator.teardown(last)
    }

    /// Replay the request queue now.
    pub async fn drain_queue(&self) -> DrainReport {
        self.queue.drain().await
    }

    /// Current connectivity.
    #[must_use]
    pub fn network_status(&self) -> NetworkStatus {
        self.network.status()
    }

    /// Number of queued requests.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    /// The network monitor; platforms report connectivity through it.
    #[must_use]
    pub const fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// The underlying engine.
    #[must_use]
    pub const fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    fn remember(&self, entity_id: &str, elapsed_seconds: u64) {
        self.last_known
            .lock()
            .insert(entity_id.to_string(), elapsed_seconds);
    }
}

async fn watch_completions(
    mut completed: broadcast::Receiver<TimerCompleted>,
    coordinator: SyncCoordinator,
    last_known: LastKnown,
) {
    loop {
        match completed.recv().await {
            Ok(event) => {
                last_known
                    .lock()
                    .insert(event.entity_id.clone(), event.snapshot.elapsed_seconds);
                let snapshot = EntitySnapshot {
                    entity_id: event.entity_id,
                    fields: event.snapshot,
                };
                if let Err(e) = coordinator.flush_snapshot(snapshot).await {
                    tracing::error!(error = %e, "final flush of completed countdown failed");
                }
            },
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "completion events lagged");
            },
            Err(RecvError::Closed) => break,
        }
    }
}
