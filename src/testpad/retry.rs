use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::error::TestpadError;
use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Wait after failed attempt `attempt` (0-based): whichever is longer of
    /// the server's hint and `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        match server_hint {
            Some(hint) => hint.max(exponential),
            None => exponential,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `op` until it succeeds, fails with a non-rate-limit error, or the
/// attempt budget is spent. The last error is returned unchanged.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, TestpadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TestpadError>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt, err.retry_after());
                warn!(
                    "Rate limited, retrying in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.delay_for(0, None), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_prefers_longer_server_hint() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        // Exponential default wins once it outgrows the hint.
        assert_eq!(
            policy.delay_for(3, Some(Duration::from_secs(5))),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }
}
