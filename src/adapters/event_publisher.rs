//! Event Publisher Adapter
//!
//! Implements the `EventPublisher` port with various backends.

use tracing::{debug, info, warn};

use crate::domain::events::CacheEvent;
use crate::domain::ports::EventPublisher;

/// Logging-based event publisher.
///
/// Publishes cache events to the tracing system. This is the default
/// diagnostic sink of a [`CacheContext`](crate::cache::CacheContext).
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventPublisher {
    /// Create a new logging event publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a publisher that logs at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

impl EventPublisher for LoggingEventPublisher {
    fn publish(&self, event: CacheEvent) {
        let event_type = event.event_type();
        let json = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));

        if event.is_failure() {
            warn!(event_type = %event_type, cache = %event.cache(), event = %json, "Cache event");
        } else if self.info_level {
            info!(event_type = %event_type, cache = %event.cache(), event = %json, "Cache event");
        } else {
            debug!(event_type = %event_type, cache = %event.cache(), event = %json, "Cache event");
        }
    }
}

/// In-memory event collector for testing.
///
/// Collects events in memory for later inspection during tests.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<CacheEvent>>,
}

impl InMemoryEventCollector {
    /// Create a new in-memory event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.read().clone()
    }

    /// Get the count of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<CacheEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

impl EventPublisher for InMemoryEventCollector {
    fn publish(&self, event: CacheEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn deleted(cache: &str) -> CacheEvent {
        CacheEvent::CacheFileDeleted {
            cache: cache.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_logging_publisher() {
        let publisher = LoggingEventPublisher::info_level();

        // Should not panic without a subscriber
        publisher.publish(deleted("feed"));
        LoggingEventPublisher::debug_level().publish(deleted("inbox"));
        publisher.publish(CacheEvent::LoadFailed {
            cache: "feed".to_string(),
            reason: "corrupt".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_in_memory_collector() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        collector.publish(deleted("feed"));
        collector.publish(deleted("inbox"));
        collector.publish(CacheEvent::Loaded {
            cache: "feed".to_string(),
            items: 0,
            truncated: false,
            timestamp: Utc::now(),
        });

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.events_of_type("CacheFileDeleted").len(), 2);
        assert_eq!(collector.events_of_type("Loaded").len(), 1);

        collector.clear();
        assert!(collector.is_empty());
    }
}
