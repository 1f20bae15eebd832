//! Condition record (spec.md §3): up to `MAX_CONDITIONS` sub-conditions,
//! used both for the primary request and, separately, for copy-source
//! conditions.

use crate::error::DplError;

/// Maximum number of sub-conditions a single [`Condition`] may hold
/// before `add` rejects further entries (spec.md §8: "Condition-list
/// overflow (> N sub-conditions) returns `enametoolong`").
pub const MAX_CONDITIONS: usize = 8;

/// A single `If-*` precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubCondition {
    IfModifiedSince(i64),
    IfUnmodifiedSince(i64),
    IfMatch(String),
    IfNoneMatch(String),
}

/// An ordered set of up to [`MAX_CONDITIONS`] sub-conditions, all of
/// which must hold for the request to proceed (the original treats the
/// list as an AND of its entries).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    entries: Vec<SubCondition>,
}

impl Condition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sub-condition, rejecting the call once the list already
    /// holds [`MAX_CONDITIONS`] entries.
    pub fn add(&mut self, cond: SubCondition) -> Result<(), DplError> {
        if self.entries.len() >= MAX_CONDITIONS {
            return Err(DplError::Enametoolong);
        }
        self.entries.push(cond);
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubCondition> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn overflow_past_max_returns_enametoolong() {
        let mut cond = Condition::new();
        for i in 0..MAX_CONDITIONS {
            cond.add(SubCondition::IfMatch(format!("etag{i}"))).unwrap();
        }
        assert_eq!(
            cond.add(SubCondition::IfMatch("one-too-many".into())),
            Err(DplError::Enametoolong)
        );
    }
}
