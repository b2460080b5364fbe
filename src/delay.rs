use std::time::Duration;

use rand::Rng;

/// Random pause taken before each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        if max < min {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    pub fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_none(&self) -> bool {
        self.max.is_zero()
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    pub async fn sleep(&self) {
        if self.is_none() {
            return;
        }
        let pause = self.sample();
        log::debug!("Waiting {}ms before next request", pause.as_millis());
        tokio::time::sleep(pause).await;
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::none()
    }
}
