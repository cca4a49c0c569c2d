//! Error types for tickvault.
//!
//! `TickvaultError` is the crate-wide error. Persistence failures travel as
//! [`SyncFailure`], which carries enough information (status code or symbolic
//! kind) for the classifier to decide whether retrying can help.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What went wrong while talking to the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The remote answered with an HTTP-style status code.
    Status(u16),
    /// The request did not complete in time.
    Timeout,
    /// The request was aborted before completing.
    Aborted,
    /// The remote refused the connection.
    ConnectionRefused,
    /// Generic connectivity failure (no route, DNS, offline).
    Connectivity,
    /// Local failure unrelated to the network (serialization, bad input).
    Local,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status {code}"),
            Self::Timeout => write!(f, "timeout"),
            Self::Aborted => write!(f, "aborted"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// A failed persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SyncFailure {
    /// Failure kind used for classification.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

impl SyncFailure {
    /// Create a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure carrying a status code.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Status(code), message)
    }

    /// Request timed out.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// Generic connectivity failure.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Connectivity, message)
    }

    /// Local, non-network failure.
    pub fn local(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Local, message)
    }

    /// The status code, if the remote produced one.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self.kind {
            FailureKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

/// Why the retry executor gave up on an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// Retrying cannot help; the first failure is returned as-is.
    #[error("terminal failure: {0}")]
    Terminal(SyncFailure),

    /// Every allowed attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of times the operation was invoked.
        attempts: u32,
        /// The failure from the final attempt.
        last: SyncFailure,
    },

    /// The session expired and could not be refreshed (or the single
    /// resubmission after refresh failed again).
    #[error("session expired: {0}")]
    AuthExpired(SyncFailure),
}

impl RetryError {
    /// The underlying failure.
    #[must_use]
    pub const fn failure(&self) -> &SyncFailure {
        match self {
            Self::Terminal(f) | Self::AuthExpired(f) => f,
            Self::Exhausted { last, .. } => last,
        }
    }

    /// True when the operation ran out of attempts on transient failures,
    /// meaning it is worth deferring to the request queue.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Main error type for tickvault.
#[derive(Debug, Error)]
pub enum TickvaultError {
    /// Configuration problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local database problem.
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity id was empty or otherwise unusable.
    #[error("Invalid entity id: {0:?}")]
    InvalidEntity(String),

    /// Duration argument could not be parsed.
    #[error("Invalid duration: {0:?} (try 25, 25m, 1h30m or 90s)")]
    InvalidDuration(String),

    /// A single persistence attempt failed.
    #[error("Sync failed: {0}")]
    Sync(#[from] SyncFailure),

    /// A persistence operation failed after classification and retry.
    #[error("Sync failed: {0}")]
    Retry(#[from] RetryError),
}

impl TickvaultError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidEntity(_) | Self::InvalidDuration(_) => 2,
            Self::NotFound(_) => 3,
            _ => 1,
        }
    }
}
