//! Size Limiting Policies
//!
//! A limiter policy is stored per cache as a single string in settings and
//! applied before every write of the buffer.

use std::fmt;
use std::str::FromStr;

use crate::domain::ports::Limiter;
use crate::error::{Error, Result};

/// Settings key of the limiter record for a cache
pub(crate) fn limiter_key(name: &str) -> String {
    format!("limiter:{}", name)
}

/// Item-count bound for a cache buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterPolicy {
    /// Keep the first `n` items, dropping from the tail
    KeepFirst(usize),
    /// Keep the last `n` items, dropping from the head
    KeepLast(usize),
}

impl LimiterPolicy {
    pub fn keep_first(max_items: usize) -> Result<Self> {
        Self::validated(LimiterPolicy::KeepFirst(max_items))
    }

    pub fn keep_last(max_items: usize) -> Result<Self> {
        Self::validated(LimiterPolicy::KeepLast(max_items))
    }

    fn validated(policy: Self) -> Result<Self> {
        if policy.max_items() == 0 {
            return Err(Error::InvalidLimiter {
                policy: policy.to_string(),
                reason: "the item bound must be at least 1".to_string(),
            });
        }
        Ok(policy)
    }

    /// Policy name as stored
    pub fn name(&self) -> &'static str {
        match self {
            LimiterPolicy::KeepFirst(_) => "keep_first",
            LimiterPolicy::KeepLast(_) => "keep_last",
        }
    }

    pub fn max_items(&self) -> usize {
        match self {
            LimiterPolicy::KeepFirst(n) | LimiterPolicy::KeepLast(n) => *n,
        }
    }
}

impl fmt::Display for LimiterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.max_items())
    }
}

impl FromStr for LimiterPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidLimiter {
            policy: s.to_string(),
            reason: reason.to_string(),
        };

        let (name, count) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("expected '<policy>:<max items>'"))?;
        let count: usize = count
            .trim()
            .parse()
            .map_err(|_| invalid("max items is not a non-negative integer"))?;

        match name.trim() {
            "keep_first" => Self::keep_first(count),
            "keep_last" => Self::keep_last(count),
            _ => Err(invalid("unknown policy, expected keep_first or keep_last")),
        }
    }
}

impl<T> Limiter<T> for LimiterPolicy {
    fn is_over_limit(&self, buffer: &[T]) -> bool {
        buffer.len() > self.max_items()
    }

    fn reduce(&self, mut buffer: Vec<T>) -> Vec<T> {
        let max = self.max_items();
        if buffer.len() <= max {
            return buffer;
        }
        match self {
            LimiterPolicy::KeepFirst(_) => buffer.truncate(max),
            LimiterPolicy::KeepLast(_) => {
                let excess = buffer.len() - max;
                buffer.drain(..excess);
            }
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn test_policy_string_form() {
        let policy = LimiterPolicy::keep_last(50).unwrap();
        assert_eq!(policy.to_string(), "keep_last:50");
        assert_eq!("keep_last:50".parse::<LimiterPolicy>().unwrap(), policy);
        assert_eq!(
            " keep_first : 7 ".parse::<LimiterPolicy>().unwrap(),
            LimiterPolicy::KeepFirst(7)
        );
    }

    #[test]
    fn test_invalid_policies() {
        assert_matches!("keep_last".parse::<LimiterPolicy>(), Err(Error::InvalidLimiter { .. }));
        assert_matches!("keep_last:-1".parse::<LimiterPolicy>(), Err(Error::InvalidLimiter { .. }));
        assert_matches!("lru:10".parse::<LimiterPolicy>(), Err(Error::InvalidLimiter { .. }));
        assert_matches!(LimiterPolicy::keep_first(0), Err(Error::InvalidLimiter { .. }));
    }

    #[test]
    fn test_keep_first_drops_tail() {
        let policy = LimiterPolicy::KeepFirst(2);
        assert!(policy.is_over_limit(&[1, 2, 3][..]));
        assert_eq!(policy.reduce(vec![1, 2, 3, 4]), vec![1, 2]);
    }

    #[test]
    fn test_keep_last_drops_head() {
        let policy = LimiterPolicy::KeepLast(2);
        assert!(!policy.is_over_limit(&[1, 2][..]));
        assert_eq!(policy.reduce(vec![1, 2, 3, 4]), vec![3, 4]);
    }

    proptest! {
        #[test]
        fn prop_reduce_respects_bound(items in prop::collection::vec(any::<u16>(), 0..64), max in 1usize..32, keep_last in any::<bool>()) {
            let policy = if keep_last { LimiterPolicy::KeepLast(max) } else { LimiterPolicy::KeepFirst(max) };
            let reduced = policy.reduce(items.clone());

            prop_assert!(!policy.is_over_limit(reduced.as_slice()));
            prop_assert_eq!(reduced.len(), items.len().min(max));

            // the kept items are a contiguous, order-preserving slice of the input
            let expected: &[u16] = if keep_last {
                &items[items.len() - reduced.len()..]
            } else {
                &items[..reduced.len()]
            };
            prop_assert_eq!(reduced.as_slice(), expected);
        }
    }
}
