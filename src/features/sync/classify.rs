//! Failure classification.
//!
//! Decides whether a failed persistence attempt is worth retrying.

use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, SyncFailure};

/// How the retry executor should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Likely transient; retry with backoff.
    Retryable,
    /// Retrying the same request cannot succeed.
    Terminal,
    /// Credentials expired; refresh the session, then resubmit once.
    AuthExpired,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Retryable => "retryable",
            Self::Terminal => "terminal",
            Self::AuthExpired => "auth_expired",
        };
        write!(f, "{s}")
    }
}

/// Classify a status code.
#[must_use]
pub const fn classify_status(code: u16) -> Classification {
    match code {
        401 => Classification::AuthExpired,
        // 408 Request Timeout and 429 Too Many Requests are worth another try
        408 | 429 => Classification::Retryable,
        500..=599 => Classification::Retryable,
        _ => Classification::Terminal,
    }
}

/// Classify a persistence failure.
#[must_use]
pub const fn classify(failure: &SyncFailure) -> Classification {
    match failure.kind {
        FailureKind::Status(code) => classify_status(code),
        FailureKind::Timeout
        | FailureKind::Aborted
        | FailureKind::ConnectionRefused
        | FailureKind::Connectivity => Classification::Retryable,
        FailureKind::Local => Classification::Terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        for code in [500, 502, 503, 504, 599] {
            assert_eq!(classify_status(code), Classification::Retryable, "{code}");
        }
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        assert_eq!(classify_status(429), Classification::Retryable);
    }

    #[test]
    fn test_client_errors_are_terminal() {
        for code in [400, 403, 404, 409, 422] {
            assert_eq!(classify_status(code), Classification::Terminal, "{code}");
        }
    }

    #[test]
    fn test_unauthorized_escalates() {
        assert_eq!(classify_status(401), Classification::AuthExpired);
    }

    #[test]
    fn test_symbolic_kinds() {
        assert_eq!(classify(&SyncFailure::timeout("t")), Classification::Retryable);
        assert_eq!(classify(&SyncFailure::connectivity("c")), Classification::Retryable);
        assert_eq!(classify(&SyncFailure::new(FailureKind::Aborted, "a")), Classification::Retryable);
        assert_eq!(classify(&SyncFailure::new(FailureKind::ConnectionRefused, "r")), Classification::Retryable);
        assert_eq!(
            classify(&SyncFailure::local("bad payload")),
            Classification::Terminal
        );
    }

    #[test]
    fn test_success_codes_are_not_retried() {
        // A 2xx/3xx reported as a failure is a caller bug, not a transient error
        assert_eq!(classify_status(200), Classification::Terminal);
        assert_eq!(classify_status(304), Classification::Terminal);
    }
}
