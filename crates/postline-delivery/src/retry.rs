//! Retry policy and per-attempt outcomes.
//!
//! The policy decides how many attempts a send gets and the base delay its
//! exponential backoff starts from. Each handled attempt produces an
//! `AttemptOutcome` so every branch of the retry decision is observable.

use std::{fmt, time::Duration};

use postline_core::{PostRequest, RetryRecord};
use serde::{Deserialize, Serialize};

/// Retry policy for failed POST attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,

    /// Base delay for exponential backoff. The first retry waits twice this.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: postline_core::DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Wraps `request` in a retry record starting at this policy's base delay.
    pub fn new_record(&self, request: PostRequest) -> RetryRecord {
        RetryRecord::with_base_delay(request, self.base_delay)
    }

    /// Whether a record with `failed_attempts` failures may be attempted again.
    pub fn allows_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts
    }
}

/// Result of handling one attempt for a logical send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt is still in flight or waiting in the queue.
    Pending,
    /// The destination answered 2xx.
    Delivered,
    /// The attempt failed and the record was queued for another attempt.
    Queued {
        /// Failed attempts so far.
        attempts: u32,
    },
    /// The attempt failed and the full queue had no room for the record.
    Dropped {
        /// Failed attempts so far.
        attempts: u32,
    },
    /// The attempt failed and no attempts remain.
    Exhausted {
        /// Failed attempts so far.
        attempts: u32,
    },
}

impl AttemptOutcome {
    /// Whether no further attempt will be made for this send.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Dropped { .. } | Self::Exhausted { .. })
    }

    /// Whether this outcome sets the send's `finished` flag.
    ///
    /// Only success and exhaustion finish a send; a dropped record stops
    /// being retried without finishing it.
    pub fn finishes_send(&self) -> bool {
        matches!(self, Self::Delivered | Self::Exhausted { .. })
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Delivered => write!(f, "delivered"),
            Self::Queued { attempts } => write!(f, "queued after {attempts} failed attempts"),
            Self::Dropped { attempts } => {
                write!(f, "dropped after {attempts} failed attempts (retry queue full)")
            },
            Self::Exhausted { attempts } => write!(f, "exhausted after {attempts} attempts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_allows_ten_attempts() {
        let policy = RetryPolicy::default();

        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(9));
        assert!(!policy.allows_retry(10));
    }

    #[test]
    fn new_record_uses_policy_base_delay() {
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(10) };

        let record = policy.new_record(PostRequest::new("http://localhost/", "x"));

        assert_eq!(record.wait_time(), Duration::from_millis(10));
        assert_eq!(record.attempts(), 0);
    }

    #[test]
    fn terminal_outcomes() {
        assert!(!AttemptOutcome::Pending.is_terminal());
        assert!(!AttemptOutcome::Queued { attempts: 1 }.is_terminal());
        assert!(AttemptOutcome::Delivered.is_terminal());
        assert!(AttemptOutcome::Dropped { attempts: 1 }.is_terminal());
        assert!(AttemptOutcome::Exhausted { attempts: 10 }.is_terminal());

        assert!(AttemptOutcome::Delivered.finishes_send());
        assert!(AttemptOutcome::Exhausted { attempts: 10 }.finishes_send());
        assert!(!AttemptOutcome::Dropped { attempts: 1 }.finishes_send());
    }

    #[test]
    fn outcome_display_format() {
        assert_eq!(AttemptOutcome::Delivered.to_string(), "delivered");
        assert_eq!(
            AttemptOutcome::Exhausted { attempts: 10 }.to_string(),
            "exhausted after 10 attempts"
        );
    }
}
