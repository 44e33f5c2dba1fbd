//! Retry policy for upstream calls.

use std::time::Duration;

use crate::error::ApiError;

/// Whether replaying a request can duplicate its effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Reads and other safe calls.
    Idempotent,
    /// Calls that create data (e.g. posting a comment).
    NonIdempotent,
}

/// Bounded retry: at most `max_attempts` sends, separated by `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of sends, including the first one.
    pub max_attempts: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Decide whether attempt number `attempt` (1-based) may be followed by another.
    pub fn should_retry(&self, attempt: u32, err: &ApiError, idempotency: Idempotency) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match idempotency {
            Idempotency::Idempotent => err.is_transient(),
            Idempotency::NonIdempotent => err.is_unprocessed(),
        }
    }

    /// Pause before the next attempt; honours `Retry-After` when rate limited.
    pub fn backoff(&self, err: &ApiError) -> Duration {
        match err {
            ApiError::RateLimited { retry_after_secs } => {
                // Never sleep longer than a few seconds inside a chat command.
                Duration::from_secs((*retry_after_secs).min(5)).max(self.delay)
            }
            _ => self.delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error() -> ApiError {
        ApiError::Http {
            status: 503,
            body: String::new(),
        }
    }

    #[test]
    fn test_default_policy_retries_once() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, &server_error(), Idempotency::Idempotent));
        assert!(!policy.should_retry(2, &server_error(), Idempotency::Idempotent));
    }

    #[test]
    fn test_terminal_errors_not_retried() {
        let policy = RetryPolicy::default();
        let not_found = ApiError::Http {
            status: 404,
            body: String::new(),
        };
        assert!(!policy.should_retry(1, &not_found, Idempotency::Idempotent));
    }

    #[test]
    fn test_non_idempotent_only_replays_unprocessed() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(1, &server_error(), Idempotency::NonIdempotent));
        assert!(!policy.should_retry(
            1,
            &ApiError::Timeout("slow".into()),
            Idempotency::NonIdempotent
        ));
        assert!(policy.should_retry(
            1,
            &ApiError::Connect("refused".into()),
            Idempotency::NonIdempotent
        ));
    }

    #[test]
    fn test_none_policy() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(1, &server_error(), Idempotency::Idempotent));
    }

    #[test]
    fn test_backoff_caps_retry_after() {
        let policy = RetryPolicy::default();
        let err = ApiError::RateLimited {
            retry_after_secs: 120,
        };
        assert_eq!(policy.backoff(&err), Duration::from_secs(5));
        assert_eq!(policy.backoff(&server_error()), Duration::from_millis(250));
    }
}
