use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the harvester reacts to failed requests.
///
/// Transient failures consume `max_attempts` and wait `backoff` between
/// tries. Server rate-limit responses wait `rate_limit_backoff` (or the
/// server's `Retry-After`) and are capped separately by
/// `max_rate_limit_retries`, so a throttled page never burns the transient
/// budget. A server-supplied wait is clamped to `max_rate_limit_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub rate_limit_backoff: Duration,
    pub max_rate_limit_retries: u32,
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(60),
            rate_limit_backoff: Duration::from_secs(1),
            max_rate_limit_retries: 30,
            max_rate_limit_wait: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Wait before the next try after a rate-limit response.
    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.rate_limit_backoff).min(self.max_rate_limit_wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_wait_prefers_server_hint_within_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_wait(None), Duration::from_secs(1));
        assert_eq!(policy.rate_limit_wait(Some(Duration::from_secs(5))), Duration::from_secs(5));
        assert_eq!(policy.rate_limit_wait(Some(Duration::from_secs(86_400))), Duration::from_secs(300));
    }
}
