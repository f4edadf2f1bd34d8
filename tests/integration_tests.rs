//! persistcache Integration Tests
//!
//! End-to-end behavior of caches opened through a context:
//! - Persistence across contexts (file-backed)
//! - Expiration and limiting
//! - Asynchronous commits and callback delivery

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use persistcache::adapters::{ChannelDispatcher, FileSettings, FileStore, InMemoryStore};
use persistcache::{CacheConfig, CacheContext, CommitCallback, Error, ExpiresIn, LimiterPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Article {
    id: u32,
    title: String,
}

fn article(id: u32) -> Article {
    Article {
        id,
        title: format!("article {}", id),
    }
}

fn file_context(dir: &std::path::Path) -> CacheContext {
    let config = CacheConfig {
        cache_dir: dir.join("caches"),
        settings_file: Some(dir.join("settings.json")),
        ..CacheConfig::default()
    };
    CacheContext::from_config(&config).unwrap()
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence_tests {
    use super::*;

    #[test]
    fn test_feed_survives_new_context() {
        let dir = tempfile::tempdir().unwrap();

        {
            let context = file_context(dir.path());
            let feed = context.open::<Article>("feed").unwrap();
            feed.load();
            feed.extend([article(1), article(2), article(3)]).unwrap();
            feed.commit().unwrap();
        }

        let context = file_context(dir.path());
        let feed = context.open::<Article>("feed").unwrap();
        feed.load();

        assert_eq!(feed.items().unwrap(), vec![article(1), article(2), article(3)]);
        assert!(!feed.is_changed());
    }

    #[test]
    fn test_settings_survive_new_context() {
        let dir = tempfile::tempdir().unwrap();

        {
            let context = file_context(dir.path());
            let feed = context.open::<Article>("feed").unwrap();
            feed.set_limiter(Some(LimiterPolicy::keep_last(4).unwrap())).unwrap();
            feed.set_expiration(i64::MAX).unwrap();
        }

        let settings = FileSettings::open(dir.path().join("settings.json")).unwrap();
        let context = CacheContext::builder()
            .store(FileStore::new(dir.path().join("caches")))
            .settings(settings)
            .build();
        let feed = context.open::<Article>("feed").unwrap();

        assert_eq!(feed.limiter().unwrap(), Some(LimiterPolicy::KeepLast(4)));
        assert_eq!(feed.expiration().unwrap(), Some(i64::MAX));
    }

    #[test]
    fn test_emptied_cache_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let context = file_context(dir.path());
        let feed = context.open::<Article>("feed").unwrap();
        let file = dir.path().join("caches").join("feed.cache");

        feed.load();
        feed.push(article(1)).unwrap();
        feed.commit().unwrap();
        assert!(file.exists());

        feed.remove(&article(1)).unwrap();
        feed.commit().unwrap();
        assert!(!file.exists());

        feed.load();
        assert!(feed.is_empty().unwrap());
    }

    #[test]
    fn test_one_instance_per_name() {
        let context = CacheContext::in_memory();
        let _feed = context.open::<Article>("feed").unwrap();

        assert!(matches!(
            context.open::<Article>("feed"),
            Err(Error::DuplicateName(name)) if name == "feed"
        ));
        assert!(matches!(
            context.open::<Article>("../feed"),
            Err(Error::InvalidName(_))
        ));
    }
}

// =============================================================================
// Expiration and Limiting
// =============================================================================

mod policy_tests {
    use super::*;

    #[test]
    fn test_expired_cache_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let context = file_context(dir.path());
        let feed = context.open::<Article>("feed").unwrap();

        feed.load();
        feed.extend((1..=3).map(article)).unwrap();
        feed.commit().unwrap();

        feed.set_expiration(chrono::Utc::now().timestamp_millis() - 1).unwrap();
        feed.load();

        assert!(feed.is_empty().unwrap());
        assert!(!dir.path().join("caches").join("feed.cache").exists());
    }

    #[test]
    fn test_relative_expiration_in_future() {
        let context = CacheContext::in_memory();
        let feed = context.open::<Article>("feed").unwrap();
        feed.load();
        feed.push(article(1)).unwrap();
        feed.commit().unwrap();

        let deadline = feed.set_expiration_in(ExpiresIn::new(0, 1, 2, 3)).unwrap();
        assert!(deadline > chrono::Utc::now().timestamp_millis());

        feed.load();
        assert_eq!(feed.len().unwrap(), 1);
    }

    #[test]
    fn test_limited_feed_reloads_bounded() {
        let context = CacheContext::in_memory();
        let feed = context.open::<Article>("feed").unwrap();
        feed.set_limiter(Some(LimiterPolicy::keep_last(5).unwrap())).unwrap();

        feed.load();
        feed.extend((1..=20).map(article)).unwrap();
        feed.commit().unwrap();

        feed.load();
        assert_eq!(
            feed.items().unwrap(),
            (16..=20).map(article).collect::<Vec<_>>()
        );
    }
}

// =============================================================================
// Asynchronous Commit
// =============================================================================

mod async_commit_tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread::ThreadId;

    #[derive(Default)]
    struct Recorder {
        committed: Mutex<Vec<ThreadId>>,
        errors: Mutex<Vec<Error>>,
    }

    impl CommitCallback for Recorder {
        fn on_error(&self, error: &Error) {
            self.errors.lock().push(error.clone());
        }

        fn on_committed(&self) {
            self.committed.lock().push(std::thread::current().id());
        }
    }

    /// Only cares about failures
    #[derive(Default)]
    struct ErrorsOnly {
        errors: AtomicUsize,
    }

    impl CommitCallback for ErrorsOnly {
        fn on_error(&self, _error: &Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_callback_delivered_once_on_owner() {
        let (dispatcher, mut queue) = ChannelDispatcher::channel();
        let context = CacheContext::builder().dispatcher(dispatcher).build();
        let feed = context.open::<Article>("feed").unwrap();
        feed.load();
        feed.push(article(1)).unwrap();

        let recorder = Arc::new(Recorder::default());
        feed.commit_async(Some(recorder.clone() as Arc<dyn CommitCallback>))
            .await
            .unwrap();

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(queue.run_pending(), 0);
        assert_eq!(*recorder.committed.lock(), vec![std::thread::current().id()]);
        assert!(recorder.errors.lock().is_empty());
        assert!(!feed.is_changed());
    }

    #[tokio::test]
    async fn test_failure_reaches_on_error() {
        let store = InMemoryStore::new();
        let (dispatcher, mut queue) = ChannelDispatcher::channel();
        let context = CacheContext::builder()
            .store(store.clone())
            .dispatcher(dispatcher)
            .build();
        let feed = context.open::<Article>("feed").unwrap();
        feed.load();
        feed.push(article(1)).unwrap();

        store.set_fail_writes(true);
        let recorder = Arc::new(Recorder::default());
        let result = feed
            .commit_async(Some(recorder.clone() as Arc<dyn CommitCallback>))
            .await;

        assert!(result.unwrap_err().is_io());
        assert!(queue.run_next().await);
        assert_eq!(recorder.errors.lock().len(), 1);
        assert!(recorder.errors.lock()[0].is_io());
        assert!(recorder.committed.lock().is_empty());
        assert!(feed.is_changed());
    }

    #[tokio::test]
    async fn test_error_only_callback_ignores_success() {
        let (dispatcher, mut queue) = ChannelDispatcher::channel();
        let context = CacheContext::builder().dispatcher(dispatcher).build();
        let feed = context.open::<Article>("feed").unwrap();
        feed.load();
        feed.push(article(1)).unwrap();

        let callback = Arc::new(ErrorsOnly::default());
        feed.commit_async(Some(callback.clone() as Arc<dyn CommitCallback>))
            .await
            .unwrap();
        queue.run_pending();
        assert_eq!(callback.errors.load(Ordering::SeqCst), 0);

        // clean cache: the background commit is rejected
        feed.commit_async(Some(callback.clone() as Arc<dyn CommitCallback>))
            .await
            .unwrap_err();
        queue.run_pending();
        assert_eq!(callback.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutations_during_commits_are_not_lost() {
        let context = CacheContext::in_memory();
        let feed = context.open::<u32>("counter").unwrap();
        feed.load();
        feed.push(0).unwrap();

        let writers = (1..=8u32).map(|w| {
            let feed = feed.clone();
            tokio::task::spawn_blocking(move || {
                for i in 0..50 {
                    feed.push(w * 1000 + i).unwrap();
                }
            })
        });
        let commits: Vec<_> = (0..8).map(|_| feed.commit_async(None)).collect();

        for writer in futures::future::join_all(writers).await {
            writer.unwrap();
        }
        for result in futures::future::join_all(commits).await {
            // a commit that finds nothing new reports InvalidState
            assert!(matches!(result, Ok(()) | Err(Error::InvalidState { .. })));
        }

        if feed.is_changed() {
            feed.commit().unwrap();
        }
        let expected = feed.len().unwrap();
        assert_eq!(expected, 1 + 8 * 50);

        feed.load();
        assert_eq!(feed.len().unwrap(), expected);
    }
}
