//! Per-key request rate limiting, used to keep REST backends under a
//! provider's published request quota. A simple token bucket keyed by an
//! arbitrary hashable key (endpoint name, operation, bucket name, ...).

pub mod quota;

use std::hash::Hash;
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use thiserror::Error;

use quota::Quota;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("rate limit exceeded")]
pub struct RateLimited;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    quota: Quota,
}

impl Bucket {
    fn new(quota: Quota) -> Self {
        Self {
            tokens: f64::from(quota.burst_size().get()),
            last_refill: Instant::now(),
            quota,
        }
    }

    fn check(&mut self) -> Result<(), RateLimited> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.last_refill = now;

        let per_token = self.quota.replenish_interval().as_secs_f64().max(f64::MIN_POSITIVE);
        let refill = elapsed.as_secs_f64() / per_token;
        let burst = f64::from(self.quota.burst_size().get());
        self.tokens = (self.tokens + refill).min(burst);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(RateLimited)
        }
    }
}

/// Keyed token-bucket rate limiter. Keys without an explicit quota fall
/// back to the `default` quota, if any; a key with neither an explicit
/// nor a default quota is always allowed.
pub struct RateLimiter<K> {
    default: Option<Quota>,
    buckets: DashMap<K, Mutex<Bucket>>,
    keyed_quotas: DashMap<K, Quota>,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a limiter with an optional default quota and explicit
    /// per-key quota overrides.
    #[must_use]
    pub fn new_with_quota(default: Option<Quota>, keyed: Vec<(K, Quota)>) -> Self {
        let keyed_quotas = DashMap::new();
        for (k, q) in keyed {
            keyed_quotas.insert(k, q);
        }
        Self {
            default,
            buckets: DashMap::new(),
            keyed_quotas,
        }
    }

    /// Checks and consumes one token for `key`, using its explicit quota
    /// if one was configured, else the default quota. If neither is set,
    /// always succeeds without tracking.
    pub fn check_key(&self, key: &K) -> Result<(), RateLimited> {
        let quota = self
            .keyed_quotas
            .get(key)
            .map(|q| *q)
            .or(self.default);

        let Some(quota) = quota else {
            return Ok(());
        };

        if let Some(bucket) = self.buckets.get(key) {
            return bucket.lock().expect("rate limiter bucket mutex poisoned").check();
        }

        let mut bucket = Bucket::new(quota);
        let result = bucket.check();
        self.buckets.insert(key.clone(), Mutex::new(bucket));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;
    use rstest::rstest;

    #[rstest]
    fn burst_then_exhausted() {
        let quota = Quota::per_second(NonZeroU32::new(3).unwrap());
        let rl: RateLimiter<String> = RateLimiter::new_with_quota(Some(quota), vec![]);
        let key = "k".to_string();
        assert!(rl.check_key(&key).is_ok());
        assert!(rl.check_key(&key).is_ok());
        assert!(rl.check_key(&key).is_ok());
        assert!(rl.check_key(&key).is_err());
    }

    #[rstest]
    fn keys_are_independent() {
        let quota = Quota::per_second(NonZeroU32::new(1).unwrap());
        let rl: RateLimiter<String> = RateLimiter::new_with_quota(Some(quota), vec![]);
        assert!(rl.check_key(&"a".to_string()).is_ok());
        assert!(rl.check_key(&"a".to_string()).is_err());
        assert!(rl.check_key(&"b".to_string()).is_ok());
    }

    #[rstest]
    fn no_quota_always_allows() {
        let rl: RateLimiter<String> = RateLimiter::new_with_quota(None, vec![]);
        for _ in 0..1000 {
            assert!(rl.check_key(&"x".to_string()).is_ok());
        }
    }
}
