//! End-to-end timer scenarios on virtual time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use tickvault::error::{RetryError, SyncFailure};
use tickvault::features::network::NetworkMonitor;
use tickvault::features::sync::{FixedJitter, RetryConfig, RetryExecutor};
use tickvault::features::timer::{
    FlushOutcome, SnapshotFields, StartOutcome, TimerMode, TimerService,
};
use tickvault::remote::{PersistenceClient, TeardownDelivery};
use tickvault::TickvaultError;

#[derive(Debug, Clone)]
struct Attempt {
    entity_id: String,
    fields: SnapshotFields,
    at: Instant,
}

/// Records every write attempt and fails the first few on request.
#[derive(Default)]
struct RecordingStore {
    attempts: Mutex<Vec<Attempt>>,
    failures: Mutex<VecDeque<SyncFailure>>,
    teardowns: Mutex<Vec<(String, Vec<u8>)>>,
    write_latency: Duration,
}

impl RecordingStore {
    fn failing_with(failures: impl IntoIterator<Item = SyncFailure>) -> Arc<Self> {
        let store = Self::default();
        store.failures.lock().extend(failures);
        Arc::new(store)
    }

    fn slow(write_latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_latency,
            ..Self::default()
        })
    }

    fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl PersistenceClient for RecordingStore {
    async fn persist_entity_snapshot(
        &self,
        entity_id: &str,
        fields: &SnapshotFields,
    ) -> Result<(), SyncFailure> {
        self.attempts.lock().push(Attempt {
            entity_id: entity_id.to_string(),
            fields: fields.clone(),
            at: Instant::now(),
        });
        if !self.write_latency.is_zero() {
            sleep(self.write_latency).await;
        }
        self.failures.lock().pop_front().map_or(Ok(()), Err)
    }
}

impl TeardownDelivery for RecordingStore {
    fn send(&self, endpoint: &str, payload: &[u8]) -> bool {
        self.teardowns
            .lock()
            .push((endpoint.to_string(), payload.to_vec()));
        true
    }
}

fn service(store: &Arc<RecordingStore>, network: NetworkMonitor) -> TimerService {
    let client: Arc<dyn PersistenceClient> = store.clone();
    let teardown: Arc<dyn TeardownDelivery> = store.clone();
    TimerService::builder(client, teardown)
        .executor(RetryExecutor::new(RetryConfig::default()).with_jitter(FixedJitter(0.0)))
        .network(network)
        .build()
}

#[tokio::test(start_paused = true)]
async fn periodic_flush_fires_once_at_the_interval() {
    let store = Arc::new(RecordingStore::default());
    let svc = service(&store, NetworkMonitor::new(true));
    let started = Instant::now();

    svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();
    sleep(Duration::from_millis(45_500)).await;

    assert_eq!(svc.get_elapsed("t1"), Some(45));
    let attempts = store.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].entity_id, "t1");
    assert_eq!(attempts[0].at - started, Duration::from_secs(30));
    assert!(attempts[0].fields.running);
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_retried_then_queued_until_reconnect() {
    let store = RecordingStore::failing_with((0..4).map(|_| SyncFailure::status(503, "unavailable")));
    let network = NetworkMonitor::new(true);
    let svc = service(&store, network.clone());

    svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();
    assert_eq!(svc.flush_now().await.unwrap(), FlushOutcome::Queued);

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 4);
    let gaps: Vec<_> = attempts.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
    assert_eq!(svc.queue_size(), 1);

    let mut drained = svc.on_queue_drained();
    network.set_online(false);
    network.set_online(true);
    sleep(Duration::from_millis(10)).await;

    assert_eq!(store.attempts().len(), 5);
    assert_eq!(svc.queue_size(), 0);
    let report = drained.try_recv().unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(report.all_succeeded());
}

#[tokio::test(start_paused = true)]
async fn client_errors_fail_immediately_without_queueing() {
    let store = RecordingStore::failing_with([SyncFailure::status(400, "bad request")]);
    let svc = service(&store, NetworkMonitor::new(true));

    svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();
    let err = svc.flush_now().await.unwrap_err();

    assert!(matches!(err, TickvaultError::Retry(RetryError::Terminal(_))));
    assert_eq!(store.attempts().len(), 1);
    assert_eq!(svc.queue_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_mid_interval_flushes_once_and_stops_ticking() {
    let store = Arc::new(RecordingStore::default());
    let svc = service(&store, NetworkMonitor::new(true));

    svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();
    sleep(Duration::from_millis(12_500)).await;
    assert_eq!(svc.stop_timer("t1").await.unwrap(), FlushOutcome::Persisted);

    assert!(!svc.engine().is_ticking());
    sleep(Duration::from_secs(60)).await;

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].fields.elapsed_seconds, 12);
    assert!(!attempts[0].fields.running);
    assert_eq!(svc.get_elapsed("t1"), Some(12));
    assert_eq!(svc.engine().live_tick_tasks(), 0);
}

#[tokio::test(start_paused = true)]
async fn starting_the_same_entity_twice_keeps_one_tick_task() {
    let store = Arc::new(RecordingStore::default());
    let svc = service(&store, NetworkMonitor::new(true));

    svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();
    let second = svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();
    assert_eq!(second, StartOutcome::Resumed);

    sleep(Duration::from_millis(3500)).await;
    assert_eq!(svc.engine().live_tick_tasks(), 1);
    assert_eq!(svc.get_elapsed("t1"), Some(3));
}

#[tokio::test(start_paused = true)]
async fn offline_stop_is_delivered_after_reconnect() {
    let store = Arc::new(RecordingStore::default());
    let network = NetworkMonitor::new(false);
    let svc = service(&store, network.clone());

    svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();
    sleep(Duration::from_millis(5500)).await;
    assert_eq!(svc.stop_timer("t1").await.unwrap(), FlushOutcome::Queued);
    assert!(store.attempts().is_empty());

    network.set_online(true);
    sleep(Duration::from_millis(10)).await;

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].fields.elapsed_seconds, 5);
    assert_eq!(svc.queue_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn teardown_hands_off_final_snapshot() {
    let store = Arc::new(RecordingStore::default());
    let svc = service(&store, NetworkMonitor::new(true));

    svc.start_timer("t1", TimerMode::Countdown { total_seconds: 60 })
        .await
        .unwrap();
    sleep(Duration::from_millis(5500)).await;
    assert!(svc.teardown());

    let teardowns = store.teardowns.lock().clone();
    assert_eq!(teardowns.len(), 1);
    assert_eq!(teardowns[0].0, "snapshots");
    let body: serde_json::Value = serde_json::from_slice(&teardowns[0].1).unwrap();
    assert_eq!(body["entity_id"], "t1");
    assert_eq!(body["elapsed_seconds"], 55);
    assert_eq!(body["running"], false);

    sleep(Duration::from_secs(60)).await;
    assert!(store.attempts().is_empty());
    assert!(svc.active().is_none());
}

#[tokio::test(start_paused = true)]
async fn completed_countdown_is_flushed_with_zero_remaining() {
    let store = Arc::new(RecordingStore::default());
    let svc = service(&store, NetworkMonitor::new(true));
    let mut completed = svc.on_timer_completed();

    svc.start_timer("t1", TimerMode::Countdown { total_seconds: 3 })
        .await
        .unwrap();
    let done = completed.recv().await.unwrap();
    assert_eq!(done.entity_id, "t1");
    sleep(Duration::from_millis(10)).await;

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].fields.elapsed_seconds, 0);
    assert!(!attempts[0].fields.running);
    assert_eq!(svc.get_elapsed("t1"), Some(0));
}

#[tokio::test(start_paused = true)]
async fn ticks_during_a_slow_write_reach_the_next_flush() {
    let store = RecordingStore::slow(Duration::from_secs(3));
    let svc = service(&store, NetworkMonitor::new(true));
    let started = Instant::now();

    svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();

    // The first periodic write is in flight from 30s to 33s
    sleep(Duration::from_millis(32_500)).await;
    assert_eq!(store.attempts().len(), 1);
    assert_eq!(svc.get_elapsed("t1"), Some(32));

    // The next interval starts once the slow write returns
    sleep(Duration::from_secs(31)).await;
    let attempts = store.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].at - started, Duration::from_secs(63));
    let first = attempts[0].fields.elapsed_seconds;
    let second = attempts[1].fields.elapsed_seconds;
    assert!((29..=30).contains(&first), "{first}");
    assert!((62..=63).contains(&second), "{second}");

    sleep(Duration::from_secs(7)).await;
    assert_eq!(svc.stop_timer("t1").await.unwrap(), FlushOutcome::Persisted);
    let attempts = store.attempts();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[2].fields.elapsed_seconds, 70);
    assert!(!attempts[2].fields.running);
}

#[tokio::test(start_paused = true)]
async fn offline_logout_keeps_the_final_value() {
    let store = Arc::new(RecordingStore::default());
    let network = NetworkMonitor::new(false);
    let svc = service(&store, network.clone());

    svc.start_timer("t1", TimerMode::Stopwatch).await.unwrap();
    sleep(Duration::from_millis(10_500)).await;
    assert_eq!(svc.logout().await.unwrap(), FlushOutcome::HandedOff);
    assert_eq!(svc.queue_size(), 0);

    network.set_online(true);
    sleep(Duration::from_millis(10)).await;
    assert!(store.attempts().is_empty());

    let teardowns = store.teardowns.lock().clone();
    assert_eq!(teardowns.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&teardowns[0].1).unwrap();
    assert_eq!(body["entity_id"], "t1");
    assert_eq!(body["elapsed_seconds"], 10);
    assert_eq!(body["running"], false);
}
