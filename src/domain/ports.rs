//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the abstractions the cache core depends on.
//! Infrastructure adapters in [`crate::adapters`] implement these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Cache Core                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  Store │ Settings │ Limiter │ Dispatcher │ Events   │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  FileStore │ FileSettings │ ChannelDispatcher │ ... │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::events::CacheEvent;
use crate::error::{Error, Result};

// =============================================================================
// Items
// =============================================================================

/// Capability every cached item must have.
///
/// Items are opaque to the cache. Equality gives them an identity for
/// `remove`/`contains`, and serde makes them storable as records.
pub trait CacheItem: Serialize + DeserializeOwned + PartialEq + Clone + Send + Sync + 'static {}

impl<T> CacheItem for T where T: Serialize + DeserializeOwned + PartialEq + Clone + Send + Sync + 'static {}

// =============================================================================
// Store Port
// =============================================================================

/// Writer returned by [`Store::open_for_write`].
///
/// Data only becomes visible under the cache's name once `finish` succeeds.
/// Dropping a writer without finishing it abandons the write.
pub trait StoreWriter: Write + Send {
    /// Flush and publish the written records.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Port for durable byte-stream storage, one stream per cache name.
pub trait Store: Send + Sync {
    /// Check whether a stream exists for `name`.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Delete the stream for `name`. Returns false if there was none.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Open the stream for reading, `None` if it does not exist.
    fn open_for_read(&self, name: &str) -> Result<Option<Box<dyn Read + Send>>>;

    /// Open the stream for writing, replacing prior contents on finish.
    fn open_for_write(&self, name: &str) -> Result<Box<dyn StoreWriter>>;

    /// Make sure the storage location exists.
    fn ensure_directory_exists(&self) -> Result<()>;
}

// =============================================================================
// Settings Port
// =============================================================================

/// Port for the small key-value store holding expiration and limiter records.
///
/// All writes must be durable before the call returns.
pub trait Settings: Send + Sync {
    fn get_long(&self, key: &str) -> Result<Option<i64>>;

    fn put_long(&self, key: &str, value: i64) -> Result<()>;

    fn get_string(&self, key: &str) -> Result<Option<String>>;

    fn put_string(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a record. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

// =============================================================================
// Limiter Port
// =============================================================================

/// Port for size-limiting policies.
pub trait Limiter<T>: Send + Sync {
    /// Check whether the buffer exceeds the configured bound.
    fn is_over_limit(&self, buffer: &[T]) -> bool;

    /// Produce a buffer that satisfies the bound.
    fn reduce(&self, buffer: Vec<T>) -> Vec<T>;
}

// =============================================================================
// Dispatcher Port
// =============================================================================

/// Unit of work handed back to the owner context.
pub type DispatchTask = Box<dyn FnOnce() + Send + 'static>;

/// Port for running work on the context that owns a cache.
pub trait Dispatcher: Send + Sync {
    /// Schedule `task` to run later on the owner context.
    fn post(&self, task: DispatchTask);
}

// =============================================================================
// Commit Callback
// =============================================================================

/// Receives the outcome of an asynchronous commit on the owner context.
///
/// Only `on_error` is required. Implementors that do not override
/// `on_committed` get no success signal.
pub trait CommitCallback: Send + Sync {
    /// The commit failed; the cache stays dirty.
    fn on_error(&self, error: &Error);

    /// The commit succeeded.
    fn on_committed(&self) {}
}

// =============================================================================
// Event Port
// =============================================================================

/// Fire-and-forget sink for cache diagnostics.
///
/// Publishing never fails and never influences the cache's control flow.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: CacheEvent);
}
