//! Sliding-window request limiter.
//!
//! At most `burst` requests may start inside any window of length `window`.
//! With the defaults (4 per second) this is the burst-of-four-then-pause
//! discipline arXiv asks harvesters to follow.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct RateLimiter {
    burst: usize,
    window: Duration,
    sent: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(burst: usize, window: Duration) -> Self {
        let burst = burst.max(1);
        Self { burst, window, sent: VecDeque::with_capacity(burst) }
    }

    /// Wait until a request may be issued, then claim the slot.
    pub async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            while let Some(&oldest) = self.sent.front() {
                if now.duration_since(oldest) >= self.window {
                    self.sent.pop_front();
                } else {
                    break;
                }
            }
            if self.sent.len() < self.burst {
                self.sent.push_back(now);
                return;
            }
            if let Some(&oldest) = self.sent.front() {
                let until = oldest + self.window;
                debug!(wait_ms = until.duration_since(now).as_millis() as u64, "Rate limit reached, pausing");
                tokio::time::sleep_until(until).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_pause() {
        let mut limiter = RateLimiter::new(4, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);

        limiter.acquire().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_refills_the_window() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(500));
        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let before = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(Instant::now(), before);
    }
}
