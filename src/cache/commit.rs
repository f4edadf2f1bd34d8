//! Asynchronous Commit
//!
//! `commit_async` performs the regular commit on a background worker and
//! reports the outcome twice:
//!
//! - through the returned [`CommitHandle`], which can be awaited
//! - through an optional [`CommitCallback`], invoked via the cache's
//!   dispatcher so it runs on the owner context rather than on the worker
//!
//! # Worker selection
//!
//! The blocking write runs on `spawn_blocking` of the context's runtime, or of
//! the runtime the caller is on. Without any runtime a dedicated thread is
//! started.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::buffered::Cache;
use crate::domain::ports::{CacheItem, CommitCallback};
use crate::error::{Error, Result};

/// Outcome of an asynchronous commit.
///
/// Await it (or call [`wait_blocking`](Self::wait_blocking) outside a
/// runtime) to learn whether the commit succeeded. Dropping the handle does
/// not cancel the commit.
#[derive(Debug)]
pub struct CommitHandle {
    cache: String,
    rx: oneshot::Receiver<Result<()>>,
}

impl CommitHandle {
    /// Name of the cache being committed
    pub fn cache(&self) -> &str {
        &self.cache
    }

    /// Block the current thread until the commit finishes.
    ///
    /// Must not be called from within an async runtime.
    pub fn wait_blocking(self) -> Result<()> {
        let cache = self.cache;
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(aborted(&cache)))
    }
}

impl Future for CommitHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(aborted(&this.cache))))
    }
}

fn aborted(cache: &str) -> Error {
    Error::CommitAborted {
        cache: cache.to_string(),
        reason: "the commit worker exited without reporting".to_string(),
    }
}

impl<T: CacheItem> Cache<T> {
    /// Commit on a background worker without blocking the caller.
    ///
    /// The callback, if any, is posted to the dispatcher once the commit
    /// finishes: `on_committed` on success, `on_error` on failure. Without a
    /// callback the outcome is still available through the returned handle
    /// and, on failure, through [`is_changed`](Cache::is_changed).
    pub fn commit_async(&self, callback: Option<Arc<dyn CommitCallback>>) -> CommitHandle {
        let (tx, rx) = oneshot::channel();
        let cache = self.clone();

        let job = move || {
            let result = cache.commit();
            cache.notify(&result, callback);
            // receiver may be gone; the commit itself already happened
            let _ = tx.send(result);
        };

        let runtime = self
            .inner
            .parts
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok());

        match runtime {
            Some(handle) => {
                debug!(cache = %self.inner.name, "Spawning blocking commit");
                handle.spawn_blocking(job);
            }
            None => {
                debug!(cache = %self.inner.name, "Spawning commit thread");
                let spawned = std::thread::Builder::new()
                    .name(format!("commit-{}", self.inner.name))
                    .spawn(job);
                if let Err(e) = spawned {
                    error!(cache = %self.inner.name, "Failed to start commit thread: {}", e);
                }
            }
        }

        CommitHandle {
            cache: self.inner.name.clone(),
            rx,
        }
    }

    fn notify(&self, result: &Result<()>, callback: Option<Arc<dyn CommitCallback>>) {
        if let Err(e) = result {
            error!(cache = %self.inner.name, "Commit error: {}", e);
        }

        let Some(callback) = callback else {
            return;
        };

        let outcome = result.clone();
        self.inner.parts.dispatcher.post(Box::new(move || match outcome {
            Ok(()) => callback.on_committed(),
            Err(e) => callback.on_error(&e),
        }));
    }
}
