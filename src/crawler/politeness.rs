//! Politeness delays between requests
//!
//! A sequential crawl sleeps a fixed delay after every productive step. The
//! worker pool instead enforces a minimum interval per host with a keyed
//! `governor` rate limiter, so workers on different hosts do not wait on
//! each other.

use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{Instrument, debug_span};

pub struct Politeness {
    delay: Duration,
    per_host: Option<DefaultKeyedRateLimiter<String>>,
}

impl Politeness {
    /// Fixed sleep after each productive step
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            per_host: None,
        }
    }

    /// Minimum interval of `delay` between requests to the same host
    pub fn per_host(delay: Duration) -> Self {
        Self {
            delay,
            per_host: Quota::with_period(delay).map(RateLimiter::keyed),
        }
    }

    /// Sleep for the configured delay.
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Wait until a request to `host` is allowed. Falls back to `pause` for
    /// fixed politeness.
    pub async fn wait_for(&self, host: &str) {
        match &self.per_host {
            Some(limiter) => {
                let key = host.to_string();
                limiter
                    .until_key_ready(&key)
                    .instrument(debug_span!("politeness", host))
                    .await;
            }
            None => self.pause().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_zero_delay_never_sleeps() {
        let politeness = Politeness::per_host(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            politeness.wait_for("e.com").await;
            politeness.pause().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_fixed_pause() {
        let politeness = Politeness::fixed(Duration::from_millis(30));
        let start = Instant::now();
        politeness.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_interval_is_per_host() {
        let politeness = Politeness::per_host(Duration::from_millis(200));

        let start = Instant::now();
        politeness.wait_for("a.com").await;
        politeness.wait_for("b.com").await;
        assert!(start.elapsed() < Duration::from_millis(150));

        politeness.wait_for("a.com").await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }
}
