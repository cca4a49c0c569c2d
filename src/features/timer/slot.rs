//! Single-occupancy handle for a scheduled background task.
//!
//! Installing a task always aborts the previous occupant first, so at most one
//! task scheduled through a slot is ever live. Dropping the slot aborts its
//! task as well.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

/// Holds at most one scheduled task.
#[derive(Debug, Default)]
pub struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    /// Create an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Abort the current task, then install the one produced by `spawn`.
    pub fn replace_with<F>(&mut self, spawn: F)
    where
        F: FnOnce() -> JoinHandle<()>,
    {
        self.cancel();
        self.handle = Some(spawn());
    }

    /// Abort the current task, if any. Returns true if one was installed.
    pub fn cancel(&mut self) -> bool {
        self.handle.take().is_some_and(|handle| {
            handle.abort();
            true
        })
    }

    /// Whether an installed task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Counts task bodies that are still alive.
///
/// A task holds a [`LiveGuard`] for as long as its future exists; the count
/// drops when the future completes or is dropped after an abort.
#[derive(Debug, Clone, Default)]
pub struct LiveCounter(Arc<AtomicUsize>);

impl LiveCounter {
    /// Mark one task body as alive until the guard drops.
    #[must_use]
    pub fn enter(&self) -> LiveGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LiveGuard(Arc::clone(&self.0))
    }

    /// Number of live task bodies.
    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decrements its [`LiveCounter`] on drop.
#[derive(Debug)]
pub struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parked(counter: &LiveCounter) -> JoinHandle<()> {
        let guard = counter.enter();
        tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_cancels_previous() {
        let live = LiveCounter::default();
        let mut slot = TaskSlot::new();

        for _ in 0..5 {
            slot.replace_with(|| parked(&live));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(live.get(), 1);
        assert!(slot.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let live = LiveCounter::default();
        let mut slot = TaskSlot::new();
        assert!(!slot.cancel());

        slot.replace_with(|| parked(&live));
        assert!(slot.cancel());
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(live.get(), 0);
        assert!(!slot.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts() {
        let live = LiveCounter::default();
        {
            let mut slot = TaskSlot::new();
            slot.replace_with(|| parked(&live));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(live.get(), 0);
    }
}
