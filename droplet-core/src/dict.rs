//! Hashed, string-keyed dictionary with insertion-tracked, per-bucket order.
//!
//! Keys are case-insensitive for HTTP-header use but preserved as given for
//! user metadata (spec invariant: dictionaries are bucketed, iteration is
//! stable in (bucket, insertion) order, and the S3 signer relies on this
//! only through the explicitly-sorted `x-amz-*` subsequence it extracts).

use std::fmt;

use crate::value::Value;

/// Default bucket count, matching the original `dpl_dict_new`'s typical
/// call sites (small dictionaries of headers or metadata).
pub const DEFAULT_N_BUCKETS: usize = 16;

fn hashcode(s: &str) -> u32 {
    // The original dpl_dict.c hash: poor dispersion, adequate for the
    // small per-request dictionaries this type is used for.
    let mut h: u32 = 0;
    for &byte in s.as_bytes() {
        h = (h << 4).wrapping_add(u32::from(byte));
        let g = h & 0xf000_0000;
        if g != 0 {
            h ^= g >> 24;
            h ^= g;
        }
    }
    h
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    value: Value,
}

/// A mapping from string key to [`Value`], bucketed for lookup and
/// iterated in stable (bucket, insertion) order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dict {
    buckets: Vec<Vec<Entry>>,
}

impl Dict {
    /// Creates a dictionary with the given number of hash buckets.
    #[must_use]
    pub fn new(n_buckets: usize) -> Self {
        let n_buckets = n_buckets.max(1);
        Self {
            buckets: vec![Vec::new(); n_buckets],
        }
    }

    fn bucket_index(&self, key: &str) -> usize {
        (hashcode(key) as usize) % self.buckets.len()
    }

    /// Inserts or updates `key` with `value`. If `lowered` is set, the key
    /// is folded to lowercase before storage (used for HTTP header
    /// dictionaries); otherwise the key is preserved verbatim (used for
    /// user metadata). Updating an existing key does not change the
    /// dictionary's element count.
    pub fn insert(&mut self, key: &str, value: Value, lowered: bool) {
        let stored_key = if lowered { key.to_lowercase() } else { key.to_string() };
        let idx = self.bucket_index(&stored_key);
        if let Some(entry) = self.buckets[idx].iter_mut().find(|e| e.key == stored_key) {
            entry.value = value;
        } else {
            self.buckets[idx].push(Entry { key: stored_key, value });
        }
    }

    /// Convenience helper matching the original `dpl_dict_add`: builds a
    /// string-valued entry in one step.
    pub fn add(&mut self, key: &str, value: impl Into<Vec<u8>>, lowered: bool) {
        self.insert(key, Value::String(value.into()), lowered);
    }

    /// Looks up `key` with exact case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let idx = self.bucket_index(key);
        self.buckets[idx].iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Looks up `key` irrespective of case by lowercasing both sides.
    #[must_use]
    pub fn get_lowered(&self, key: &str) -> Option<&Value> {
        let lowered = key.to_lowercase();
        let idx = self.bucket_index(&lowered);
        self.buckets[idx]
            .iter()
            .find(|e| e.key.to_lowercase() == lowered)
            .map(|e| &e.value)
    }

    /// Looks up `key` and returns it decoded as UTF-8 text, exact case.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Removes the entry for `key` if present, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.bucket_index(key);
        let bucket = &mut self.buckets[idx];
        let pos = bucket.iter().position(|e| e.key == key)?;
        Some(bucket.remove(pos).value)
    }

    /// Number of entries across all buckets.
    #[must_use]
    pub fn count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Iterates entries in stable (bucket, insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.buckets
            .iter()
            .flat_map(|b| b.iter())
            .map(|e| (e.key.as_str(), &e.value))
    }

    /// Returns a deep copy restricted to keys that start with `prefix`
    /// (case-sensitive), with the prefix stripped from the returned keys.
    #[must_use]
    pub fn filter_prefix(&self, prefix: &str) -> Dict {
        let mut out = Dict::new(self.buckets.len());
        for (k, v) in self.iter() {
            if let Some(stripped) = k.strip_prefix(prefix) {
                out.insert(stripped, v.clone(), false);
            }
        }
        out
    }

    /// Returns a deep copy of this dictionary.
    #[must_use]
    pub fn deep_copy(&self) -> Dict {
        self.clone()
    }
}

impl Default for Dict {
    fn default() -> Self {
        Self::new(DEFAULT_N_BUCKETS)
    }
}

impl fmt::Display for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn add_then_get_roundtrips_case() {
        let mut d = Dict::default();
        d.add("X-Object-Meta-Foo", "bar", false);
        assert_eq!(d.get("X-Object-Meta-Foo").unwrap().as_str(), Some("bar"));
    }

    #[rstest]
    fn lowered_lookup_is_case_insensitive() {
        let mut d = Dict::default();
        d.add("Content-Type", "text/plain", true);
        assert_eq!(d.get_lowered("CONTENT-TYPE").unwrap().as_str(), Some("text/plain"));
        assert_eq!(d.get_lowered("content-type").unwrap().as_str(), Some("text/plain"));
    }

    #[rstest]
    fn second_add_overwrites_without_growing_count() {
        let mut d = Dict::default();
        d.add("k", "v1", false);
        d.add("k", "v2", false);
        assert_eq!(d.count(), 1);
        assert_eq!(d.get("k").unwrap().as_str(), Some("v2"));
    }

    #[rstest]
    fn filter_prefix_strips_and_copies() {
        let mut d = Dict::default();
        d.add("X-Object-Meta-A", "1", false);
        d.add("X-Object-Meta-B", "2", false);
        d.add("Content-Length", "10", false);
        let filtered = d.filter_prefix("X-Object-Meta-");
        assert_eq!(filtered.count(), 2);
        assert_eq!(filtered.get("A").unwrap().as_str(), Some("1"));
    }

    #[rstest]
    fn iteration_order_is_stable_across_calls() {
        let mut d = Dict::default();
        for i in 0..20 {
            d.add(&format!("k{i}"), i.to_string(), false);
        }
        let first: Vec<_> = d.iter().map(|(k, _)| k.to_string()).collect();
        let second: Vec<_> = d.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn add_get_roundtrip(key in "[a-zA-Z][a-zA-Z0-9_-]{0,20}", val in ".{0,40}") {
            let mut d = Dict::default();
            d.add(&key, val.clone(), false);
            prop_assert_eq!(d.get(&key).unwrap().as_str(), Some(val.as_str()));
        }

        #[test]
        fn repeated_add_keeps_count_stable(key in "[a-z]{1,10}", a in ".{0,20}", b in ".{0,20}") {
            let mut d = Dict::default();
            d.add(&key, a, false);
            let count_after_first = d.count();
            d.add(&key, b.clone(), false);
            prop_assert_eq!(d.count(), count_after_first);
            prop_assert_eq!(d.get(&key).unwrap().as_str(), Some(b.as_str()));
        }
    }
}
