//! Cache Context
//!
//! The host context caches are opened in. It owns the collaborators shared by
//! all of its caches (store, settings, dispatcher, event sink) and makes sure
//! each cache name is open at most once at a time.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::debug;

use super::buffered::{Cache, CacheParts};
use crate::adapters::{
    FileSettings, FileStore, InMemorySettings, InMemoryStore, InlineDispatcher,
    LoggingEventPublisher,
};
use crate::config::CacheConfig;
use crate::domain::ports::{CacheItem, Dispatcher, EventPublisher, Settings, Store};
use crate::error::{Error, Result};

/// Names currently open in a context
type OpenNames = Arc<Mutex<HashSet<String>>>;

/// Holds a cache name while the cache is alive
pub(crate) struct NameGuard {
    names: OpenNames,
    name: String,
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        self.names.lock().remove(&self.name);
        debug!(cache = %self.name, "Cache closed");
    }
}

/// Check that `name` can serve as a file name.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if invalid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Shared collaborators for a set of caches
#[derive(Clone)]
pub struct CacheContext {
    parts: CacheParts,
    open_names: OpenNames,
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("open_caches", &self.open_names.lock().len())
            .field("has_runtime", &self.parts.runtime.is_some())
            .finish()
    }
}

impl CacheContext {
    pub fn builder() -> CacheContextBuilder {
        CacheContextBuilder::default()
    }

    /// Context that keeps everything in memory (for testing)
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    /// File-backed context built from configuration.
    ///
    /// Uses the default [`InlineDispatcher`]. Use
    /// [`CacheContextBuilder::from_config`] to deliver commit callbacks to an
    /// owner context instead.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Ok(CacheContextBuilder::from_config(config)?.build())
    }

    /// Open the cache called `name`.
    ///
    /// Fails if the name is unusable or a cache with the same name is still
    /// open in this context. The cache is not loaded yet.
    pub fn open<T: CacheItem>(&self, name: impl Into<String>) -> Result<Cache<T>> {
        let name = name.into();
        validate_name(&name)?;

        if !self.open_names.lock().insert(name.clone()) {
            return Err(Error::DuplicateName(name));
        }
        debug!(cache = %name, "Cache opened");

        let guard = NameGuard {
            names: Arc::clone(&self.open_names),
            name: name.clone(),
        };
        Ok(Cache::new(name, self.parts.clone(), guard))
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.open_names.lock().contains(name)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.parts.store
    }

    pub fn settings(&self) -> &Arc<dyn Settings> {
        &self.parts.settings
    }
}

/// Builder for [`CacheContext`].
///
/// Unset collaborators default to in-memory store and settings, an
/// [`InlineDispatcher`] and a [`LoggingEventPublisher`].
#[derive(Default)]
pub struct CacheContextBuilder {
    store: Option<Arc<dyn Store>>,
    settings: Option<Arc<dyn Settings>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    events: Option<Arc<dyn EventPublisher>>,
    runtime: Option<Handle>,
}

impl CacheContextBuilder {
    /// Builder preset with the file-backed store and settings described by
    /// `config`. Fails if the configuration is inconsistent or the settings
    /// document cannot be read.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let store = FileStore::new(&config.cache_dir)
            .with_extension(config.file_extension.clone())
            .with_atomic_writes(config.atomic_writes);
        let settings = FileSettings::open(config.settings_path())?;

        Ok(Self::default().store(store).settings(settings))
    }

    pub fn store(self, store: impl Store + 'static) -> Self {
        self.store_arc(Arc::new(store))
    }

    pub fn store_arc(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn settings(self, settings: impl Settings + 'static) -> Self {
        self.settings_arc(Arc::new(settings))
    }

    pub fn settings_arc(mut self, settings: Arc<dyn Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn dispatcher(self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher_arc(Arc::new(dispatcher))
    }

    pub fn dispatcher_arc(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn events(self, events: impl EventPublisher + 'static) -> Self {
        self.events_arc(Arc::new(events))
    }

    pub fn events_arc(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Runtime whose blocking pool runs asynchronous commits
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Finish the context.
    ///
    /// Without an explicit dispatcher, commit callbacks run inline on the
    /// commit worker. Set a [`ChannelDispatcher`](crate::adapters::ChannelDispatcher)
    /// to have them run on the thread that drains its queue.
    pub fn build(self) -> CacheContext {
        CacheContext {
            parts: CacheParts {
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(InMemoryStore::new())),
                settings: self
                    .settings
                    .unwrap_or_else(|| Arc::new(InMemorySettings::new())),
                dispatcher: self
                    .dispatcher
                    .unwrap_or_else(|| Arc::new(InlineDispatcher)),
                events: self
                    .events
                    .unwrap_or_else(|| Arc::new(LoggingEventPublisher::new())),
                runtime: self.runtime,
            },
            open_names: OpenNames::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_name_validation() {
        assert!(validate_name("feed").is_ok());
        assert!(validate_name("feed-2024_v1.json").is_ok());

        for bad in ["", ".hidden", "..", "a/b", "a\\b", "tab\there"] {
            assert_matches!(validate_name(bad), Err(Error::InvalidName(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_duplicate_name_until_dropped() {
        let context = CacheContext::in_memory();
        let first = context.open::<u32>("feed").unwrap();
        assert!(context.is_open("feed"));

        assert_matches!(context.open::<u32>("feed"), Err(Error::DuplicateName(_)));
        // clones share the registration
        let clone = first.clone();
        drop(first);
        assert!(context.is_open("feed"));

        drop(clone);
        assert!(!context.is_open("feed"));
        assert!(context.open::<u32>("feed").is_ok());
    }

    #[test]
    fn test_caches_share_settings_but_not_files() {
        let context = CacheContext::in_memory();
        let feed = context.open::<u32>("feed").unwrap();
        let inbox = context.open::<u32>("inbox").unwrap();

        feed.set_expiration(10).unwrap();
        assert_eq!(feed.expiration().unwrap(), Some(10));
        assert_eq!(inbox.expiration().unwrap(), None);

        feed.load();
        inbox.load();
        feed.push(1).unwrap();
        feed.commit().unwrap();

        assert!(context.store().exists("feed").unwrap());
        assert!(!context.store().exists("inbox").unwrap());
    }

    #[test]
    fn test_from_config_uses_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            cache_dir: dir.path().join("caches"),
            settings_file: Some(dir.path().join("settings.json")),
            ..CacheConfig::default()
        };

        let context = CacheContext::from_config(&config).unwrap();
        let cache = context.open::<String>("feed").unwrap();
        cache.load();
        cache.push("hello".to_string()).unwrap();
        cache.commit().unwrap();
        cache.set_expiration(i64::MAX).unwrap();

        assert!(dir.path().join("caches").join("feed.cache").exists());
        assert!(dir.path().join("settings.json").exists());
    }

    #[test]
    fn test_config_context_delivers_callbacks_to_owner() {
        use crate::adapters::ChannelDispatcher;
        use crate::domain::ports::CommitCallback;
        use std::thread::ThreadId;

        #[derive(Default)]
        struct Threads(Mutex<Vec<ThreadId>>);

        impl CommitCallback for Threads {
            fn on_error(&self, _error: &Error) {
                self.0.lock().push(std::thread::current().id());
            }

            fn on_committed(&self) {
                self.0.lock().push(std::thread::current().id());
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ..CacheConfig::default()
        };
        let (dispatcher, mut queue) = ChannelDispatcher::channel();
        let context = CacheContextBuilder::from_config(&config)
            .unwrap()
            .dispatcher(dispatcher)
            .build();

        let cache = context.open::<u32>("feed").unwrap();
        cache.load();
        cache.push(1).unwrap();

        let threads = Arc::new(Threads::default());
        cache
            .commit_async(Some(threads.clone() as Arc<dyn CommitCallback>))
            .wait_blocking()
            .unwrap();

        assert!(threads.0.lock().is_empty());
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*threads.0.lock(), vec![std::thread::current().id()]);
        assert!(config.cache_dir.join("feed.cache").exists());
    }

    #[test]
    fn test_settings_file_cannot_shadow_a_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            settings_file: Some(dir.path().join("settings.json")),
            file_extension: "json".to_string(),
            ..CacheConfig::default()
        };
        assert_matches!(CacheContext::from_config(&config), Err(Error::Config(_)));

        // the default settings document is a dotfile, outside the cache names
        let config = CacheConfig {
            settings_file: None,
            ..config
        };
        let context = CacheContext::from_config(&config).unwrap();
        let cache = context.open::<u32>("settings").unwrap();
        cache.set_expiration(i64::MAX).unwrap();
        cache.load();
        cache.push(1).unwrap();
        cache.commit().unwrap();

        let reopened = FileSettings::open(config.settings_path()).unwrap();
        assert_eq!(reopened.get_long("expiration:settings").unwrap(), Some(i64::MAX));
    }
}
