//! The durable single active timer.
//!
//! One entity is timed at a time. The engine ticks it once per second, the
//! coordinator persists snapshots periodically and at lifecycle edges, and
//! the service ties both to the retry executor, request queue and network
//! monitor.

pub mod coordinator;
pub mod engine;
pub mod format;
pub mod service;
pub mod slot;
pub mod state;

pub use coordinator::{queue_key, CoordinatorConfig, FlushOutcome, SyncCoordinator, SyncEvent};
pub use engine::{StartOutcome, TimerCompleted, TimerEngine};
pub use format::{format_clock, format_words, parse_duration, progress_bar};
pub use service::{TimerService, TimerServiceBuilder};
pub use slot::TaskSlot;
pub use state::{EntitySnapshot, SnapshotFields, TickOutcome, TimerMode, TimerState};
