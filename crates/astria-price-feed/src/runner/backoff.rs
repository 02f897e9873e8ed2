use std::time::Duration;

use rand::Rng as _;

/// The jittered part of a delay is at most this fraction of the exponential base.
///
/// Must stay below 1 for the delays to be non-decreasing.
const MAX_JITTER: f64 = 0.5;

/// Exponential backoff with jitter.
///
/// The delay before attempt `n` is `initial * 2^(n - 1)` plus up to 50% random jitter, capped at
/// `max`. Delays never decrease with `n` and never exceed `max`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Returns the delay after `failures` consecutive failures, with random jitter.
    pub(crate) fn delay(&self, failures: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER);
        self.delay_with_jitter(failures, jitter)
    }

    /// `jitter` is clamped to `[0, MAX_JITTER)`.
    fn delay_with_jitter(&self, failures: u32, jitter: f64) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let base = self
            .initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |base| base.min(self.max));
        let jitter = jitter.clamp(0.0, MAX_JITTER - f64::EPSILON);
        base.saturating_add(base.mul_f64(jitter)).min(self.max)
    }
}
