use std::time::Duration;

use rand::Rng;

use crate::error::ScraperError;

/// Exponential backoff for transient request failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause after `failed` consecutive failures (1-based).
    pub fn backoff(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(63) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor.max(1.0).powi(exp);
        let capped = if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        };

        if self.jitter && !capped.is_zero() {
            let half = capped / 2;
            half + rand::thread_rng().gen_range(Duration::ZERO..=capped - half)
        } else {
            capped
        }
    }

    pub fn delay_for(&self, failed: u32, err: &ScraperError) -> Duration {
        let backoff = self.backoff(failed);
        match err.retry_after() {
            Some(wait) => backoff.max(wait).min(self.max_delay),
            None => backoff,
        }
    }
}
