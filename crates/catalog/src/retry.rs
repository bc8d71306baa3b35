//! Backoff for transient store errors.
//!
//! Delays are deterministic for a given `(attempt, spread)` pair. The spread
//! is a caller-chosen salt (the key's enumeration index for `get`, the page
//! number for `list`) so concurrent fetches hitting the same outage do not
//! wake up in lockstep.

use std::time::Duration;

/// How the nominal delay grows between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    Fixed,
    /// `base * 2^(retry - 1)`, capped at `max_delay`.
    #[default]
    Exponential,
}

/// Retry budget and backoff for one kind of store call.
///
/// `max_attempts` counts retries after the initial call: `max_attempts = 3`
/// allows four calls in total.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Fraction of the nominal delay used as a +/- jitter band, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(50), Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Constant delay, no jitter.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another retry is allowed after `retries` retries.
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_attempts
    }

    /// Sleep before retry number `retry` (1-based) of the call identified by `spread`.
    ///
    /// Never exceeds `max_delay`.
    pub fn delay_for_attempt(&self, retry: u32, spread: u64) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let nominal = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 1u32 << (retry - 1).min(20);
                self.base_delay.saturating_mul(factor)
            }
        }
        .min(self.max_delay);

        let band = nominal.mul_f64(self.jitter.clamp(0.0, 1.0));
        if band.is_zero() {
            return nominal;
        }

        let offset = band.mul_f64(2.0 * unit_interval(spread, retry));
        nominal.saturating_sub(band).saturating_add(offset).min(self.max_delay)
    }
}

/// Map `(spread, retry)` to a value in `[0, 1)` (splitmix64 finalizer).
fn unit_interval(spread: u64, retry: u32) -> f64 {
    let mut z = spread
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(u64::from(retry));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}
