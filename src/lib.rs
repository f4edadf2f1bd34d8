//! persistcache - Persisted, Buffered Object Caches
//!
//! A cache is an ordered list of serializable items kept in memory and backed
//! by one file. Applications load it, change the buffer, and commit it back,
//! either blocking or on a background worker with a callback delivered to the
//! owner context.
//!
//! # Architecture
//!
//! ```text
//! CacheContext ──open──▶ Cache<T> ──commit──▶ Store
//!      │                    │
//!      └── Settings ◀───────┘ (expiration, limiter records)
//! ```
//!
//! # Features
//!
//! - Absolute or relative expiration, checked on load
//! - Keep-first / keep-last size limiting applied before every write
//! - Asynchronous commits with awaitable handles and dispatched callbacks
//! - File and in-memory adapters for storage and settings
//!
//! # Modules
//!
//! - [`adapters`] - Implementations of the domain ports
//! - [`cache`] - Cache context, buffered cache and policies
//! - [`config`] - YAML and environment configuration
//! - [`domain`] - Ports and events
//! - [`error`] - Error types
//! - [`telemetry`] - Logging setup

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod telemetry;

pub use cache::{Cache, CacheContext, CommitHandle, ExpiresIn, LimiterPolicy};
pub use config::{CacheConfig, LogConfig};
pub use domain::{CacheEvent, CacheItem, CommitCallback};
pub use error::{Error, Result};
