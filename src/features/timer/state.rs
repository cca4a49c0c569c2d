//! Timer state and snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction the timer counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerMode {
    /// Counts up from zero.
    Stopwatch,
    /// Counts down from `total_seconds` to zero, then completes.
    Countdown {
        /// Starting value in seconds.
        total_seconds: u64,
    },
}

impl TimerMode {
    /// Value `elapsed_seconds` starts at.
    #[must_use]
    pub const fn initial_seconds(&self) -> u64 {
        match self {
            Self::Stopwatch => 0,
            Self::Countdown { total_seconds } => *total_seconds,
        }
    }

    /// Check if this is a countdown.
    #[must_use]
    pub const fn is_countdown(&self) -> bool {
        matches!(self, Self::Countdown { .. })
    }
}

impl std::fmt::Display for TimerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopwatch => write!(f, "stopwatch"),
            Self::Countdown { total_seconds } => write!(f, "countdown ({total_seconds}s)"),
        }
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer moved by one second.
    Ticked {
        /// Value after the tick.
        elapsed_seconds: u64,
    },
    /// A countdown reached zero.
    Completed,
    /// No timer is active.
    Idle,
}

/// State of the single active timer.
///
/// For a countdown, `elapsed_seconds` holds the remaining time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    /// Entity the timer belongs to.
    pub entity_id: String,
    /// Counting direction.
    pub mode: TimerMode,
    /// Current value in seconds.
    pub elapsed_seconds: u64,
    /// When this session started.
    pub started_at: DateTime<Utc>,
    /// When the last tick was applied.
    pub last_tick_at: DateTime<Utc>,
    /// When a snapshot of this session was last confirmed persisted.
    pub last_persisted_at: Option<DateTime<Utc>>,
}

impl TimerState {
    /// Create state for a freshly started timer.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, mode: TimerMode) -> Self {
        let now = Utc::now();
        Self {
            entity_id: entity_id.into(),
            mode,
            elapsed_seconds: mode.initial_seconds(),
            started_at: now,
            last_tick_at: now,
            last_persisted_at: None,
        }
    }

    /// Advance by one second. Countdowns floor at zero.
    pub fn tick(&mut self) -> TickOutcome {
        self.last_tick_at = Utc::now();
        match self.mode {
            TimerMode::Stopwatch => {
                self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
            },
            TimerMode::Countdown { .. } => {
                self.elapsed_seconds = self.elapsed_seconds.saturating_sub(1);
                if self.elapsed_seconds == 0 {
                    return TickOutcome::Completed;
                }
            },
        }
        TickOutcome::Ticked {
            elapsed_seconds: self.elapsed_seconds,
        }
    }

    /// Capture the mutable fields for persistence.
    #[must_use]
    pub fn snapshot(&self, running: bool) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id.clone(),
            fields: SnapshotFields {
                elapsed_seconds: self.elapsed_seconds,
                mode: self.mode,
                running,
                captured_at: Utc::now(),
            },
        }
    }
}

/// The persisted fields of a timed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFields {
    /// Elapsed (stopwatch) or remaining (countdown) seconds.
    pub elapsed_seconds: u64,
    /// Counting direction.
    pub mode: TimerMode,
    /// Whether the timer was still running when captured.
    pub running: bool,
    /// Capture time; later captures win.
    pub captured_at: DateTime<Utc>,
}

/// A point-in-time copy of the active timer, keyed by entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity id.
    pub entity_id: String,
    /// Captured fields.
    pub fields: SnapshotFields,
}
