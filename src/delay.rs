use rand::prelude::*;
use std::cell::RefCell;
use std::time::Duration;

thread_local! {
    static THREAD_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::seed_from_u64(0));
}

/// Configuration for retry delays with jitter
#[derive(Debug, Clone, Copy)]
pub struct RetryDelay {
    /// Base delay (in milliseconds) before applying exponential backoff and jitter
    base_delay_ms: u64,
    /// Maximum delay (in milliseconds) after applying exponential backoff and jitter
    max_delay_ms: u64,
}

impl RetryDelay {
    /// Creates a new RetryDelay configuration
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Returns the configured base delay in milliseconds
    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    /// Returns the configured maximum delay in milliseconds
    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Calculates the delay for a given retry attempt using exponential backoff with full jitter.
    ///
    /// The exponential delay `base_delay * 2^retry_count` is capped at
    /// `max_delay`, then a value between 0 and the capped delay is drawn so
    /// that writers waiting on the same partition lock wake up spread out.
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let exp_delay = 2u64
            .checked_pow(retry_count)
            .and_then(|factor| self.base_delay_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);

        let capped_delay = exp_delay.min(self.max_delay_ms);

        let jittered_delay = THREAD_RNG.with(|rng| rng.borrow_mut().random_range(0..=capped_delay));

        Duration::from_millis(jittered_delay)
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 30_000,
        }
    }
}
