use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::delay::DelayRange;

/// Token bucket: `burst` tokens, one token added every `1s / per_second`.
///
/// Must be created inside a tokio runtime; the refill task stops when the
/// last clone is dropped.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    permits: Arc<Semaphore>,
    refill: JoinHandle<()>,
    per_second: NonZeroU32,
}

impl Drop for Bucket {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

impl RateLimiter {
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        let capacity = burst.get() as usize;
        let permits = Arc::new(Semaphore::new(capacity));
        let period = Duration::from_secs(1) / per_second.get();

        let permits_c = permits.clone();
        let refill = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if permits_c.available_permits() < capacity {
                    permits_c.add_permits(1);
                }
            }
        });

        Self {
            inner: Arc::new(Bucket {
                permits,
                refill,
                per_second,
            }),
        }
    }

    pub fn per_second(&self) -> u32 {
        self.inner.per_second.get()
    }

    pub async fn acquire(&self) {
        // The semaphore is never closed, so acquire only fails if it was.
        if let Ok(permit) = self.inner.permits.acquire().await {
            permit.forget();
        }
    }

    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

/// Everything a request waits on before it is sent.
#[derive(Debug, Clone, Default)]
pub struct Throttle {
    limiter: Option<RateLimiter>,
    delay: DelayRange,
}

impl Throttle {
    pub fn new(limiter: Option<RateLimiter>, delay: DelayRange) -> Self {
        Self { limiter, delay }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub async fn admit(&self) {
        self.delay.sleep().await;
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
    }
}
