//! The single active timer.
//!
//! The engine owns at most one [`TimerState`] and at most one tick task.
//! Every transition cancels the current tick task before anything else and
//! bumps a generation counter; a tick carrying an older generation is
//! ignored, so a cancelled task that is still winding down can never mutate
//! the state of a newer session.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};

use super::slot::{LiveCounter, LiveGuard, TaskSlot};
use super::state::{EntitySnapshot, SnapshotFields, TickOutcome, TimerMode, TimerState};

/// Published when a countdown reaches zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerCompleted {
    /// Entity whose countdown finished.
    pub entity_id: String,
    /// Final fields, with `running` false.
    pub snapshot: SnapshotFields,
}

/// Result of [`TimerEngine::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session began. `previous` is the session it replaced, if any.
    Started {
        /// State of the replaced session.
        previous: Option<TimerState>,
    },
    /// The same entity and mode were already active; ticking restarted.
    Resumed,
    /// The entity id was blank. The engine is now idle.
    Rejected,
}

#[derive(Debug, Default)]
struct Current {
    timer: Option<TimerState>,
    generation: u64,
}

struct EngineInner {
    current: Mutex<Current>,
    ticker: Mutex<TaskSlot>,
    live: LiveCounter,
    completed: broadcast::Sender<TimerCompleted>,
    tick_interval: Duration,
}

impl EngineInner {
    /// Apply one tick if `generation` still matches. `None` skips the check.
    fn tick_if_current(&self, generation: Option<u64>) -> TickOutcome {
        let mut current = self.current.lock();
        if generation.is_some_and(|g| g != current.generation) {
            return TickOutcome::Idle;
        }
        let Some(timer) = current.timer.as_mut() else {
            return TickOutcome::Idle;
        };

        let outcome = timer.tick();
        if outcome == TickOutcome::Completed {
            if let Some(done) = current.timer.take() {
                current.generation += 1;
                tracing::info!(entity = %done.entity_id, "countdown completed");
                let event = TimerCompleted {
                    snapshot: done.snapshot(false).fields,
                    entity_id: done.entity_id,
                };
                // No subscribers is fine
                let _ = self.completed.send(event);
            }
        }
        outcome
    }
}

/// Owner of the single active timer. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TimerEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("state", &self.state())
            .field("tick_interval", &self.inner.tick_interval)
            .finish_non_exhaustive()
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerEngine {
    /// Create an idle engine ticking once per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tick_interval(Duration::from_secs(1))
    }

    /// Create an idle engine with a custom tick period.
    #[must_use]
    pub fn with_tick_interval(tick_interval: Duration) -> Self {
        let (completed, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(EngineInner {
                current: Mutex::new(Current::default()),
                ticker: Mutex::new(TaskSlot::new()),
                live: LiveCounter::default(),
                completed,
                tick_interval,
            }),
        }
    }

    /// Start timing `entity_id`.
    ///
    /// Any previous session is replaced and returned in the outcome so the
    /// caller can flush it. Must be called from within a tokio runtime.
    pub fn start(&self, entity_id: &str, mode: TimerMode) -> StartOutcome {
        let mut ticker = self.inner.ticker.lock();
        ticker.cancel();

        let (outcome, generation) = {
            let mut current = self.inner.current.lock();
            current.generation += 1;

            if entity_id.trim().is_empty() {
                let abandoned = current.timer.take().map(|t| t.entity_id);
                tracing::warn!(?abandoned, "rejected timer start with empty entity id");
                return StartOutcome::Rejected;
            }

            let outcome = match current.timer.as_ref() {
                Some(t) if t.entity_id == entity_id && t.mode == mode => StartOutcome::Resumed,
                _ => StartOutcome::Started {
                    previous: current.timer.replace(TimerState::new(entity_id, mode)),
                },
            };
            (outcome, current.generation)
        };

        let engine = Arc::downgrade(&self.inner);
        let period = self.inner.tick_interval;
        let live = self.inner.live.enter();
        ticker.replace_with(|| tokio::spawn(tick_loop(engine, generation, period, live)));

        tracing::info!(entity = entity_id, mode = %mode, "timer started");
        outcome
    }

    /// Stop the active timer and return its final state.
    pub fn stop(&self) -> Option<TimerState> {
        self.halt(None)
    }

    /// Stop the active timer only if it belongs to `entity_id`.
    pub fn stop_entity(&self, entity_id: &str) -> Option<TimerState> {
        self.halt(Some(entity_id))
    }

    fn halt(&self, only: Option<&str>) -> Option<TimerState> {
        let mut ticker = self.inner.ticker.lock();
        let mut current = self.inner.current.lock();
        if let Some(id) = only {
            if current.timer.as_ref().map(|t| t.entity_id.as_str()) != Some(id) {
                return None;
            }
        }

        ticker.cancel();
        current.generation += 1;
        let stopped = current.timer.take();
        if let Some(t) = &stopped {
            tracing::info!(entity = %t.entity_id, elapsed = t.elapsed_seconds, "timer stopped");
        }
        stopped
    }

    /// Apply one tick immediately, outside the scheduled tick task.
    pub fn tick(&self) -> TickOutcome {
        self.inner.tick_if_current(None)
    }

    /// Copy of the active state.
    #[must_use]
    pub fn state(&self) -> Option<TimerState> {
        self.inner.current.lock().timer.clone()
    }

    /// Snapshot of the active timer with `running` set.
    #[must_use]
    pub fn snapshot(&self) -> Option<EntitySnapshot> {
        self.inner
            .current
            .lock()
            .timer
            .as_ref()
            .map(|t| t.snapshot(true))
    }

    /// Check if a timer is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.current.lock().timer.is_some()
    }

    /// Id of the active entity.
    #[must_use]
    pub fn active_entity(&self) -> Option<String> {
        self.inner
            .current
            .lock()
            .timer
            .as_ref()
            .map(|t| t.entity_id.clone())
    }

    /// Current value for `entity_id` if it is the active entity.
    #[must_use]
    pub fn elapsed(&self, entity_id: &str) -> Option<u64> {
        self.inner
            .current
            .lock()
            .timer
            .as_ref()
            .filter(|t| t.entity_id == entity_id)
            .map(|t| t.elapsed_seconds)
    }

    /// Record that a snapshot of `entity_id` reached the store.
    ///
    /// Returns false if `entity_id` is no longer active.
    pub fn record_persisted(&self, entity_id: &str, at: DateTime<Utc>) -> bool {
        let mut current = self.inner.current.lock();
        match current.timer.as_mut() {
            Some(t) if t.entity_id == entity_id => {
                t.last_persisted_at = Some(at);
                true
            },
            _ => false,
        }
    }

    /// Subscribe to countdown completions.
    #[must_use]
    pub fn subscribe_completed(&self) -> broadcast::Receiver<TimerCompleted> {
        self.inner.completed.subscribe()
    }

    /// Whether a tick task is scheduled.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.inner.ticker.lock().is_active()
    }

    /// Number of tick task bodies not yet dropped.
    #[must_use]
    pub fn live_tick_tasks(&self) -> usize {
        self.inner.live.get()
    }
}

async fn tick_loop(engine: Weak<EngineInner>, generation: u64, period: Duration, _live: LiveGuard) {
    let mut ticks = interval_at(Instant::now() + period, period);
    loop {
        ticks.tick().await;
        let Some(inner) = engine.upgrade() else {
            break;
        };
        match inner.tick_if_current(Some(generation)) {
            TickOutcome::Ticked { .. } => {},
            TickOutcome::Completed | TickOutcome::Idle => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopwatch_ticks_every_second() {
        let engine = TimerEngine::new();
        assert_eq!(
            engine.start("t1", TimerMode::Stopwatch),
            StartOutcome::Started { previous: None }
        );

        sleep(Duration::from_millis(5500)).await;
        assert_eq!(engine.elapsed("t1"), Some(5));
        assert_eq!(engine.active_entity().as_deref(), Some("t1"));
        assert!(engine.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_completes_and_goes_idle() {
        let engine = TimerEngine::new();
        let mut completed = engine.subscribe_completed();
        engine.start("t1", TimerMode::Countdown { total_seconds: 3 });

        sleep(Duration::from_millis(3500)).await;

        let event = completed.try_recv().expect("completion should be published");
        assert_eq!(event.entity_id, "t1");
        assert_eq!(event.snapshot.elapsed_seconds, 0);
        assert!(!event.snapshot.running);
        assert!(!engine.is_active());
        assert_eq!(engine.live_tick_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticking() {
        let engine = TimerEngine::new();
        engine.start("t1", TimerMode::Stopwatch);
        sleep(Duration::from_millis(2500)).await;

        let stopped = engine.stop().expect("timer was active");
        assert_eq!(stopped.elapsed_seconds, 2);

        sleep(secs(10)).await;
        assert!(!engine.is_active());
        assert_eq!(engine.elapsed("t1"), None);
        assert_eq!(engine.live_tick_tasks(), 0);
        assert!(engine.stop().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_entity_ignores_other_ids() {
        let engine = TimerEngine::new();
        engine.start("a", TimerMode::Stopwatch);

        assert!(engine.stop_entity("b").is_none());
        assert!(engine.is_ticking());
        assert_eq!(engine.stop_entity("a").map(|s| s.entity_id).as_deref(), Some("a"));
        assert!(!engine.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_entity_returns_previous() {
        let engine = TimerEngine::new();
        engine.start("a", TimerMode::Stopwatch);
        sleep(Duration::from_millis(3500)).await;

        match engine.start("b", TimerMode::Stopwatch) {
            StartOutcome::Started {
                previous: Some(prev),
            } => {
                assert_eq!(prev.entity_id, "a");
                assert_eq!(prev.elapsed_seconds, 3);
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.elapsed("a"), None);
        assert_eq!(engine.elapsed("b"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_same_entity_keeps_value() {
        let engine = TimerEngine::new();
        engine.start("a", TimerMode::Stopwatch);
        sleep(Duration::from_millis(2500)).await;

        assert_eq!(engine.start("a", TimerMode::Stopwatch), StartOutcome::Resumed);
        assert_eq!(engine.elapsed("a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_entity_is_rejected() {
        let engine = TimerEngine::new();
        engine.start("a", TimerMode::Stopwatch);

        assert_eq!(engine.start("  ", TimerMode::Stopwatch), StartOutcome::Rejected);
        assert!(!engine.is_active());
        settle().await;
        assert_eq!(engine.live_tick_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_transitions_leave_one_tick_task() {
        let engine = TimerEngine::new();
        for i in 0..100 {
            engine.start(&format!("entity-{}", i % 7), TimerMode::Stopwatch);
            if i % 10 == 0 {
                engine.stop();
            }
        }
        settle().await;
        assert_eq!(engine.live_tick_tasks(), 1);

        // Only one task advances the value
        sleep(secs(3)).await;
        assert_eq!(engine.elapsed("entity-1"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_tick_task_under_interleaving() {
        let engine = TimerEngine::new();
        for round in 0..20_u64 {
            engine.start(
                if round % 2 == 0 { "even" } else { "odd" },
                TimerMode::Countdown { total_seconds: 2 },
            );
            sleep(Duration::from_millis(300 * (round % 5) + 10)).await;
            assert!(engine.live_tick_tasks() <= 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_persisted() {
        let engine = TimerEngine::new();
        engine.start("a", TimerMode::Stopwatch);
        let at = Utc::now();

        assert!(engine.record_persisted("a", at));
        assert!(!engine.record_persisted("b", at));
        assert_eq!(engine.state().and_then(|s| s.last_persisted_at), Some(at));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_tick() {
        let engine = TimerEngine::with_tick_interval(secs(3600));
        assert_eq!(engine.tick(), TickOutcome::Idle);

        engine.start("a", TimerMode::Countdown { total_seconds: 2 });
        assert_eq!(engine.tick(), TickOutcome::Ticked { elapsed_seconds: 1 });
        assert_eq!(engine.tick(), TickOutcome::Completed);
        assert!(!engine.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_running() {
        let engine = TimerEngine::new();
        assert!(engine.snapshot().is_none());

        engine.start("a", TimerMode::Stopwatch);
        let snap = engine.snapshot().expect("active");
        assert_eq!(snap.entity_id, "a");
        assert!(snap.fields.running);
    }
}
