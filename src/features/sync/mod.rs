//! Resilient delivery of persistence operations.
//!
//! Failures are classified, retried with jittered exponential backoff, and
//! deferred into a bounded request queue when retries run out or the network
//! is down. The queue is drained when connectivity returns.

pub mod backoff;
pub mod classify;
pub mod executor;
pub mod operation;
pub mod queue;

pub use backoff::{Backoff, FixedJitter, JitterSource, ThreadRngJitter};
pub use classify::{classify, classify_status, Classification};
pub use executor::{RetryConfig, RetryExecutor, SessionRefresher};
pub use operation::{deferred, DeferredOperation, DrainOutcome, DrainReport, QueuedRequest};
pub use queue::{QueueConfig, RequestQueue};
