//! Expiration Policy
//!
//! A cache may carry an absolute expiration timestamp (milliseconds since the
//! Unix epoch) in its settings record. It is only checked when the cache is
//! loaded: a cache loaded at or after its expiration starts empty.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MILLIS_PER_MINUTE: i64 = 60 * 1000;
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;
pub const MILLIS_PER_WEEK: i64 = 7 * MILLIS_PER_DAY;

/// Settings key of the expiration record for a cache
pub(crate) fn expiration_key(name: &str) -> String {
    format!("expiration:{}", name)
}

/// Current time in milliseconds since the epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A cache loaded at `now` is expired once `now` reaches the expiration.
pub fn is_expired(expiration: i64, now: i64) -> bool {
    now >= expiration
}

/// Relative expiration, counted from the moment it is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiresIn {
    #[serde(default)]
    pub weeks: u64,
    #[serde(default)]
    pub days: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
}

impl ExpiresIn {
    pub fn new(weeks: u64, days: u64, hours: u64, minutes: u64) -> Self {
        Self {
            weeks,
            days,
            hours,
            minutes,
        }
    }

    pub fn weeks(weeks: u64) -> Self {
        Self {
            weeks,
            ..Self::default()
        }
    }

    pub fn days(days: u64) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn hours(hours: u64) -> Self {
        Self {
            hours,
            ..Self::default()
        }
    }

    pub fn minutes(minutes: u64) -> Self {
        Self {
            minutes,
            ..Self::default()
        }
    }

    /// Length of the span in milliseconds, `None` if it does not fit in `i64`.
    pub fn as_millis(&self) -> Option<i64> {
        let part = |count: u64, unit: i64| i64::try_from(count).ok()?.checked_mul(unit);

        part(self.weeks, MILLIS_PER_WEEK)?
            .checked_add(part(self.days, MILLIS_PER_DAY)?)?
            .checked_add(part(self.hours, MILLIS_PER_HOUR)?)?
            .checked_add(part(self.minutes, MILLIS_PER_MINUTE)?)
    }

    /// Absolute expiration when applied at `now`.
    ///
    /// Spans that leave the `i64` millisecond range are rejected.
    pub fn deadline_from(&self, now: i64) -> Result<i64> {
        self.as_millis()
            .and_then(|span| now.checked_add(span))
            .ok_or_else(|| Error::ExpirationOverflow(format!("{:?} from {}", self, now)))
    }
}
