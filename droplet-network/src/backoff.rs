//! Exponential backoff with jitter, used to pace connection retries
//! against an endpoint without hammering it (the connection pool's
//! retry policy stays endpoint-blacklisting as spec.md Non-goals state;
//! this is the per-attempt pacing primitive consumers build retry loops
//! out of, modeled on the teacher crate's `nautilus_network::backoff`).

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BackoffError {
    #[error("factor must be in [1.0, 100.0], got {0}")]
    InvalidFactor(f64),
    #[error("max delay must be >= initial delay")]
    MaxLessThanInitial,
}

/// Exponential backoff generator: each call to [`Self::next_duration`]
/// returns the current base delay (doubled-ish by `factor` each call, up
/// to `max`) plus up to `jitter_ms` of random jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    jitter_ms: u64,
    immediate_first: bool,
    current: Duration,
    first_call: bool,
}

impl ExponentialBackoff {
    /// Creates a new backoff generator. `factor` must be in `[1.0, 100.0]`
    /// and `max >= initial`.
    pub fn new(
        initial: Duration,
        max: Duration,
        factor: f64,
        jitter_ms: u64,
        immediate_first: bool,
    ) -> Result<Self, BackoffError> {
        if !(1.0..=100.0).contains(&factor) {
            return Err(BackoffError::InvalidFactor(factor));
        }
        if max < initial {
            return Err(BackoffError::MaxLessThanInitial);
        }
        Ok(Self {
            initial,
            max,
            factor,
            jitter_ms,
            immediate_first,
            current: initial,
            first_call: true,
        })
    }

    /// The current base delay (before jitter) that the next call will
    /// use, before any growth from this call is applied.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// Returns the next delay to wait, growing the base delay toward
    /// `max` for subsequent calls. With `immediate_first` set, the very
    /// first call returns `Duration::ZERO` without consuming growth.
    pub fn next_duration(&mut self) -> Duration {
        if self.immediate_first && self.first_call {
            self.first_call = false;
            return Duration::ZERO;
        }
        self.first_call = false;

        let base = self.current;
        let jitter = if self.jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=self.jitter_ms))
        };

        let grown = self.current.mul_f64(self.factor);
        self.current = grown.min(self.max);

        base + jitter
    }

    /// Restores the generator to its initial state.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.first_call = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn rejects_out_of_range_factor() {
        assert!(ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), 0.5, 0, false).is_err());
        assert!(ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), 150.0, 0, false).is_err());
    }

    #[rstest]
    fn grows_toward_max_and_clamps() {
        let mut b = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            0,
            false,
        )
        .unwrap();
        let mut last = Duration::ZERO;
        for _ in 0..10 {
            let d = b.next_duration();
            assert!(d >= last);
            last = d;
        }
        assert_eq!(b.current_delay(), Duration::from_millis(100));
    }

    #[rstest]
    fn immediate_first_returns_zero_once() {
        let mut b = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            0,
            true,
        )
        .unwrap();
        assert_eq!(b.next_duration(), Duration::ZERO);
        assert!(b.next_duration() >= Duration::from_millis(10));
    }

    #[rstest]
    fn reset_restores_initial_delay() {
        let mut b = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            0,
            false,
        )
        .unwrap();
        b.next_duration();
        b.next_duration();
        b.reset();
        assert_eq!(b.current_delay(), Duration::from_millis(10));
    }
}
