//! Retry executor for persistence operations.
//!
//! Runs an async operation with bounded, classified retries: terminal
//! failures are returned after one attempt, retryable failures back off
//! exponentially, and an expired session is refreshed and the operation
//! resubmitted exactly once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::backoff::{Backoff, JitterSource, ThreadRngJitter};
use super::classify::{classify, Classification};
use crate::error::{RetryError, SyncFailure};

/// Configuration for the retry executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (total invocations ≤ `max_retries + 1`).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap for the un-jittered delay.
    pub max_delay: Duration,
    /// Backoff growth factor.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff curve for this configuration.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        Backoff {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
        }
    }
}

/// Collaborator that renews an expired session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    /// Refresh credentials so the failed request can be resubmitted.
    async fn refresh(&self) -> Result<(), SyncFailure>;
}

/// Executes operations with classified, bounded retries.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    jitter: Arc<dyn JitterSource>,
    refresher: Option<Arc<dyn SessionRefresher>>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("refresher", &self.refresher.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryExecutor {
    /// Create an executor with random jitter and no session refresher.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            jitter: Arc::new(ThreadRngJitter),
            refresher: None,
        }
    }

    /// Replace the jitter source.
    #[must_use]
    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Attach a session refresher for 401-style failures.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn SessionRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` until it succeeds, fails terminally, or runs out of retries.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Terminal`] after a single non-retryable failure,
    /// [`RetryError::Exhausted`] with the last failure after
    /// `max_retries + 1` retryable failures, and [`RetryError::AuthExpired`]
    /// when the session cannot be refreshed or the refreshed resubmit would
    /// exceed `max_retries + 1` invocations.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncFailure>>,
    {
        let backoff = self.config.backoff();
        let mut attempt: u32 = 0;
        let mut previous_delay = Duration::ZERO;

        loop {
            let failure = match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                    }
                    return Ok(value);
                },
                Err(failure) => failure,
            };

            match classify(&failure) {
                Classification::Terminal => {
                    tracing::error!(error = %failure, "operation failed with terminal error");
                    return Err(RetryError::Terminal(failure));
                },
                Classification::AuthExpired => {
                    // The resubmit is one more invocation and must fit the budget
                    if attempt >= self.config.max_retries {
                        tracing::error!(
                            error = %failure,
                            attempts = attempt + 1,
                            "session expired with no attempts left to resubmit"
                        );
                        return Err(RetryError::AuthExpired(failure));
                    }
                    return self.refresh_and_resubmit(&mut op, failure, attempt + 1).await;
                },
                Classification::Retryable => {
                    if attempt >= self.config.max_retries {
                        tracing::warn!(
                            error = %failure,
                            attempts = attempt + 1,
                            "operation failed after all retry attempts exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            last: failure,
                        });
                    }

                    // Jitter near the cap could shrink the delay; never go backwards
                    let delay = backoff
                        .delay(attempt, self.jitter.as_ref())
                        .max(previous_delay);
                    previous_delay = delay;
                    attempt += 1;

                    tracing::warn!(
                        error = %failure,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    async fn refresh_and_resubmit<T, F, Fut>(
        &self,
        op: &mut F,
        failure: SyncFailure,
        attempts_so_far: u32,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncFailure>>,
    {
        let Some(refresher) = &self.refresher else {
            tracing::error!(error = %failure, "session expired and no refresher is configured");
            return Err(RetryError::AuthExpired(failure));
        };

        if let Err(refresh_error) = refresher.refresh().await {
            tracing::error!(error = %refresh_error, "session refresh failed");
            return Err(RetryError::AuthExpired(failure));
        }

        tracing::info!("session refreshed, resubmitting operation once");
        match op().await {
            Ok(value) => Ok(value),
            Err(again) => match classify(&again) {
                Classification::Retryable => Err(RetryError::Exhausted {
                    attempts: attempts_so_far + 1,
                    last: again,
                }),
                Classification::AuthExpired => Err(RetryError::AuthExpired(again)),
                Classification::Terminal => Err(RetryError::Terminal(again)),
            },
        }
    }
}
