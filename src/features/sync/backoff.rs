//! Exponential backoff with bounded jitter.
//!
//! `delay(n) = min(initial * multiplier^n, max)`, plus a uniform jitter of up
//! to 30% of that value. The jitter source is injectable so tests can pin it.

use std::time::Duration;

use rand::Rng;

/// Fraction of the base delay that jitter may add.
pub const JITTER_RATIO: f64 = 0.3;

/// Source of jitter samples in `[0, 1)`.
pub trait JitterSource: Send + Sync {
    /// Draw the next sample.
    fn sample(&self) -> f64;
}

/// Jitter drawn from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// Constant jitter, for deterministic tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Backoff curve parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for the un-jittered delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// Un-jittered delay for `attempt` (0-based): `min(d0 * m^n, dmax)`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn floor(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();

        // powi overflows to inf for large attempts; min() keeps it bounded
        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// Jittered delay for `attempt`, in `[floor, 1.3 * floor)`.
    #[must_use]
    pub fn delay(&self, attempt: u32, jitter: &dyn JitterSource) -> Duration {
        let floor = self.floor(attempt);
        let sample = jitter.sample().clamp(0.0, 1.0);
        let extra = floor.as_secs_f64() * JITTER_RATIO * sample;

        // A sample of exactly 1.0 would land on the open upper bound
        let extra = if sample >= 1.0 {
            (extra - 1e-9).max(0.0)
        } else {
            extra
        };

        floor + Duration::from_secs_f64(extra)
    }
}
