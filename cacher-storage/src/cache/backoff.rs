//! Jittered exponential backoff for lock polling.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff between `min` and `max` with "equal jitter":
/// each delay is drawn from `[base / 2, base]` where `base` doubles per
/// attempt and is capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(20), Duration::from_millis(250))
    }
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            attempt: 0,
        }
    }

    /// Next delay; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let base = self.min.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        let hi = base.as_micros() as u64;
        let lo = (hi / 2).max(self.min.as_micros() as u64).min(hi);
        Duration::from_micros(rand::rng().random_range(lo..=hi))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
