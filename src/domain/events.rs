//! Cache Events
//!
//! Immutable records of things that happened to a cache. They are published
//! through the [`EventPublisher`](super::ports::EventPublisher) port and serve
//! as the cache's diagnostic log.
//!
//! # Example
//!
//! ```ignore
//! let event = CacheEvent::Committed {
//!     cache: "feed".to_string(),
//!     commit_id: Uuid::new_v4(),
//!     items: 3,
//!     timestamp: Utc::now(),
//! };
//!
//! publisher.publish(event);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event representing a significant occurrence in a cache's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    // =========================================================================
    // Load Events
    // =========================================================================
    /// Items were read from the backing file.
    Loaded {
        cache: String,
        items: usize,
        /// A malformed record cut the read short
        truncated: bool,
        timestamp: DateTime<Utc>,
    },

    /// The expiration passed and the backing file was discarded.
    Expired {
        cache: String,
        expired_at: i64,
        timestamp: DateTime<Utc>,
    },

    /// Reading failed; the cache starts out empty.
    LoadFailed {
        cache: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Limiter Events
    // =========================================================================
    /// The buffer was reduced by the limiter.
    Limited {
        cache: String,
        policy: String,
        before: usize,
        after: usize,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Commit Events
    // =========================================================================
    /// The buffer was written to the backing file.
    Committed {
        cache: String,
        commit_id: Uuid,
        items: usize,
        timestamp: DateTime<Utc>,
    },

    /// The backing file was removed because the buffer was empty.
    CacheFileDeleted {
        cache: String,
        timestamp: DateTime<Utc>,
    },

    /// Writing the buffer failed.
    CommitFailed {
        cache: String,
        commit_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Loaded { .. } => "Loaded",
            CacheEvent::Expired { .. } => "Expired",
            CacheEvent::LoadFailed { .. } => "LoadFailed",
            CacheEvent::Limited { .. } => "Limited",
            CacheEvent::Committed { .. } => "Committed",
            CacheEvent::CacheFileDeleted { .. } => "CacheFileDeleted",
            CacheEvent::CommitFailed { .. } => "CommitFailed",
        }
    }

    /// Name of the cache the event belongs to.
    pub fn cache(&self) -> &str {
        match self {
            CacheEvent::Loaded { cache, .. }
            | CacheEvent::Expired { cache, .. }
            | CacheEvent::LoadFailed { cache, .. }
            | CacheEvent::Limited { cache, .. }
            | CacheEvent::Committed { cache, .. }
            | CacheEvent::CacheFileDeleted { cache, .. }
            | CacheEvent::CommitFailed { cache, .. } => cache,
        }
    }

    /// When the event occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CacheEvent::Loaded { timestamp, .. }
            | CacheEvent::Expired { timestamp, .. }
            | CacheEvent::LoadFailed { timestamp, .. }
            | CacheEvent::Limited { timestamp, .. }
            | CacheEvent::Committed { timestamp, .. }
            | CacheEvent::CacheFileDeleted { timestamp, .. }
            | CacheEvent::CommitFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Check if this event reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CacheEvent::LoadFailed { .. } | CacheEvent::CommitFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_and_cache() {
        let at = Utc::now();
        let event = CacheEvent::Limited {
            cache: "feed".to_string(),
            policy: "keep_last:2".to_string(),
            before: 5,
            after: 2,
            timestamp: at,
        };

        assert_eq!(event.event_type(), "Limited");
        assert_eq!(event.timestamp(), at);
        assert_eq!(event.cache(), "feed");
        assert!(!event.is_failure());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CacheEvent::CommitFailed {
            cache: "feed".to_string(),
            commit_id: Uuid::new_v4(),
            reason: "disk full".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"CommitFailed\""));
        assert!(json.contains("disk full"));

        let back: CacheEvent = serde_json::from_str(&json).unwrap();
        assert!(back.is_failure());
        assert_eq!(back.cache(), "feed");
    }
}
