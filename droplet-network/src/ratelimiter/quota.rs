//! Token-bucket quota description: a burst size and a per-token
//! replenish interval, in the style of a classic GCRA rate limiter.

use std::num::NonZeroU32;
use std::time::Duration;

/// Describes a rate limit as a burst capacity and the interval between
/// individual token replenishments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    burst_size: NonZeroU32,
    replenish_interval: Duration,
}

impl Quota {
    /// A quota allowing `rate` requests per second, replenishing linearly
    /// (one token every `1s / rate`), with burst capacity `rate`.
    #[must_use]
    pub fn per_second(rate: NonZeroU32) -> Self {
        Self::from_period_and_burst(Duration::from_secs(1), rate)
    }

    /// A quota allowing `rate` requests per minute, burst capacity `rate`.
    #[must_use]
    pub fn per_minute(rate: NonZeroU32) -> Self {
        Self::from_period_and_burst(Duration::from_secs(60), rate)
    }

    /// A quota allowing `rate` requests per hour, burst capacity `rate`.
    #[must_use]
    pub fn per_hour(rate: NonZeroU32) -> Self {
        Self::from_period_and_burst(Duration::from_secs(3600), rate)
    }

    /// A quota that replenishes its single token every `period`. Returns
    /// `None` if `period` is zero.
    #[must_use]
    pub fn with_period(period: Duration) -> Option<Self> {
        if period.is_zero() {
            return None;
        }
        Some(Self {
            burst_size: NonZeroU32::new(1).expect("1 is nonzero"),
            replenish_interval: period,
        })
    }

    /// Returns a copy of this quota with its burst capacity changed to
    /// `burst`, keeping the same per-token replenish interval.
    #[must_use]
    pub fn allow_burst(self, burst: NonZeroU32) -> Self {
        Self {
            burst_size: burst,
            replenish_interval: self.replenish_interval,
        }
    }

    fn from_period_and_burst(total_period: Duration, burst: NonZeroU32) -> Self {
        Self {
            burst_size: burst,
            replenish_interval: total_period / burst.get(),
        }
    }

    #[must_use]
    pub fn burst_size(&self) -> NonZeroU32 {
        self.burst_size
    }

    /// The interval between individual token replenishments.
    #[must_use]
    pub fn replenish_interval(&self) -> Duration {
        self.replenish_interval
    }
}
