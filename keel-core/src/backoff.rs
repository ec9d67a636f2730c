//! Bounded exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Retry delay policy: doubling from `base`, capped at `max`, jittered so
/// many objects failing at once do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// The uncapped delay for attempt n is `base * 2^n`; the returned value
    /// is jittered uniformly into `[delay/2, delay)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(1u64 << attempt.min(32))
            .min(max_ms);
        let half = (delay_ms / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..half);
        Duration::from_millis(half + jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}
