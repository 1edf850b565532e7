//! Request pacing.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Lets the first `burst` operations through, then keeps successive
/// operations at least `min_delay` apart.
#[derive(Debug)]
pub struct RateLimiter {
    burst: usize,
    min_delay: Duration,
    issued: usize,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(burst: usize, min_delay: Duration) -> Self {
        Self {
            burst,
            min_delay,
            issued: 0,
            last_request: None,
        }
    }

    /// Paced from the first operation on, for background sweeps.
    pub fn steady(min_delay: Duration) -> Self {
        Self::new(0, min_delay)
    }

    /// Wait until the next operation may start.
    pub async fn pace(&mut self) {
        if self.issued >= self.burst {
            let wait = match self.last_request {
                Some(last) => self.min_delay.saturating_sub(last.elapsed()),
                None => self.min_delay,
            };
            if !wait.is_zero() {
                debug!("Rate limiting: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        self.issued += 1;
        self.last_request = Some(Instant::now());
    }

    pub fn issued(&self) -> usize {
        self.issued
    }
}
