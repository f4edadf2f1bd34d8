//! Domain Layer
//!
//! The seams of the cache core.
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for storage, settings,
//!   limiting, dispatch and diagnostics
//! - **Events** (`events.rs`) - Records of what happened to a cache
//!
//! # Usage
//!
//! ```ignore
//! use persistcache::domain::ports::{Settings, Store};
//!
//! fn backing_file_exists<S: Store + ?Sized>(store: &S, name: &str) -> Result<bool> {
//!     store.exists(name)
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::CacheEvent;
pub use ports::{
    CacheItem, CommitCallback, DispatchTask, Dispatcher, EventPublisher, Limiter, Settings, Store,
    StoreWriter,
};
