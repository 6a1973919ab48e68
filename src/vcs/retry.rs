use std::time::Duration;

use super::VcsError;
use crate::scheduler::{sleep_cancellable, CancelToken};

/// Exponential backoff for transient VCS failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries including the first one (at least 1).
    pub attempts: u32,
    /// Delay before the second try; doubled for each further try.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        // attempt is 1-based; no delay before the first try
        let exp = attempt.saturating_sub(2).min(16);
        self.backoff.saturating_mul(1u32 << exp)
    }
}

/// Run `op`, retrying while it fails with a transient error. Returns the last
/// error once attempts are exhausted or the token is cancelled.
pub fn with_retry<T, F>(policy: RetryPolicy, cancel: &CancelToken, mut op: F) -> Result<T, VcsError>
where
    F: FnMut() -> Result<T, VcsError>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < attempts && !cancel.is_cancelled() => {
                attempt += 1;
                let delay = policy.delay_before(attempt);
                tracing::warn!(
                    op = %e.op,
                    attempt,
                    attempts,
                    delay = ?delay,
                    error = %e,
                    "transient failure; retrying"
                );
                sleep_cancellable(delay, cancel);
            }
            Err(e) => return Err(e),
        }
    }
}
