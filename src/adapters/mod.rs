//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  Store │ Settings │ Dispatcher │ EventPublisher            │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ FileStore │ InMemoryStore │ FileSettings │ InMemorySettings │ │
//! │  │ ChannelDispatcher │ InlineDispatcher │ LoggingEventPublisher│ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use persistcache::adapters::{ChannelDispatcher, FileSettings, FileStore};
//! use persistcache::cache::CacheContext;
//!
//! let (dispatcher, queue) = ChannelDispatcher::channel();
//! let context = CacheContext::builder()
//!     .store(FileStore::new("/var/cache/app"))
//!     .settings(FileSettings::open("/var/cache/app/settings.json")?)
//!     .dispatcher(dispatcher)
//!     .build();
//! ```

mod dispatcher;
mod event_publisher;
mod file_store;
mod memory_store;
mod settings;

pub use dispatcher::{ChannelDispatcher, DispatchQueue, InlineDispatcher};
pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use file_store::{FileStore, DEFAULT_EXTENSION};
pub use memory_store::{InMemoryStore, InMemoryStoreStats};
pub use settings::{FileSettings, InMemorySettings, SettingValue};
