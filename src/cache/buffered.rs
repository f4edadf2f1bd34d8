//! Buffered Cache
//!
//! An ordered, in-memory buffer of items backed by one file in a [`Store`].
//!
//! # Lifecycle
//!
//! ```text
//! load ──▶ mutate (dirty) ──▶ limit ──▶ commit (clean)
//!   ▲                                      │
//!   └──────────────────────────────────────┘
//! ```
//!
//! - `load` checks the expiration record first and discards an expired file,
//!   then reads every record. It never fails: unreadable data yields an empty
//!   (or partially filled) buffer.
//! - Every mutation marks the cache dirty; `commit` refuses to run on a clean
//!   cache.
//! - The limiter is applied before every write and whenever a new policy is
//!   set.
//!
//! # Concurrency
//!
//! The buffer, the dirty flag and commit entry share one mutex. A commit holds
//! it for the whole write, so mutations issued while an asynchronous commit is
//! running wait for it to finish and two commits never interleave.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::codec::{decode_records, encode_to_vec, write_encoded};
use super::context::NameGuard;
use super::expiration::{self, expiration_key, ExpiresIn};
use super::limiter::{limiter_key, LimiterPolicy};
use crate::domain::events::CacheEvent;
use crate::domain::ports::{
    CacheItem, Dispatcher, EventPublisher, Limiter, Settings, Store,
};
use crate::error::{Error, Result};

/// Buffer and dirty flag, guarded together
#[derive(Debug)]
pub(crate) struct CacheState<T> {
    /// `None` until the first load
    pub(crate) buffer: Option<Vec<T>>,
    pub(crate) dirty: bool,
}

/// Collaborators a cache is built from
#[derive(Clone)]
pub(crate) struct CacheParts {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) settings: Arc<dyn Settings>,
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) runtime: Option<Handle>,
}

pub(crate) struct Inner<T> {
    pub(crate) name: String,
    pub(crate) parts: CacheParts,
    pub(crate) state: Mutex<CacheState<T>>,
    /// Releases the name in the owning context when the cache goes away
    _registration: NameGuard,
}

/// Persisted, buffered cache of `T` items.
///
/// Cloning is cheap and yields another handle to the same cache.
pub struct Cache<T> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("loaded", &state.buffer.is_some())
            .field("items", &state.buffer.as_ref().map(Vec::len))
            .field("dirty", &state.dirty)
            .finish()
    }
}

impl<T: CacheItem> Cache<T> {
    pub(crate) fn new(name: String, parts: CacheParts, registration: NameGuard) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                parts,
                state: Mutex::new(CacheState {
                    buffer: None,
                    dirty: false,
                }),
                _registration: registration,
            }),
        }
    }

    /// Cache name (also the name of its backing file)
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn publish(&self, event: CacheEvent) {
        self.inner.parts.events.publish(event);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Read the backing file into a fresh buffer.
    ///
    /// An expired cache starts empty and its file is deleted. Read failures are logged and
    /// leave whatever was decoded before the failure (possibly nothing). The
    /// cache is clean afterwards.
    #[instrument(skip(self), fields(cache = %self.inner.name))]
    pub fn load(&self) {
        let mut state = self.inner.state.lock();

        let expired = self.discard_if_expired();
        let opened = if expired {
            Ok(None)
        } else {
            self.inner.parts.store.open_for_read(&self.inner.name)
        };

        let (items, truncated) = match opened {
            Ok(None) => {
                debug!("No cache file, starting empty");
                (Vec::new(), false)
            }
            Ok(Some(reader)) => {
                let outcome = decode_records::<T, _>(reader);
                if let Some(e) = &outcome.error {
                    warn!("Stopped reading cache file after {} items: {}", outcome.items.len(), e);
                }
                let truncated = outcome.is_truncated();
                (outcome.items, truncated)
            }
            Err(e) => {
                error!("Error loading items: {}", e);
                self.publish(CacheEvent::LoadFailed {
                    cache: self.inner.name.clone(),
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                (Vec::new(), false)
            }
        };

        self.publish(CacheEvent::Loaded {
            cache: self.inner.name.clone(),
            items: items.len(),
            truncated,
            timestamp: Utc::now(),
        });
        info!("Read {} items from the cache file", items.len());
        state.buffer = Some(items);
        state.dirty = false;
    }

    /// Delete the backing file if the cache has expired. Returns true if it
    /// has, in which case the file must not be read even if the delete failed.
    fn discard_if_expired(&self) -> bool {
        let expiration = match self.expiration() {
            Ok(Some(expiration)) => expiration,
            Ok(None) => return false,
            Err(e) => {
                warn!("Could not read expiration, ignoring it: {}", e);
                return false;
            }
        };

        if !expiration::is_expired(expiration, expiration::now_millis()) {
            return false;
        }

        match self.inner.parts.store.delete(&self.inner.name) {
            Ok(_) => info!("Cache has expired, re-creating"),
            Err(e) => warn!("Cache has expired but the file could not be deleted: {}", e),
        }
        self.publish(CacheEvent::Expired {
            cache: self.inner.name.clone(),
            expired_at: expiration,
            timestamp: Utc::now(),
        });
        true
    }

    /// True once `load` has run
    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().buffer.is_some()
    }

    /// Flag the buffer as changed since the last load or commit.
    pub fn mark_changed(&self) {
        self.inner.state.lock().dirty = true;
    }

    /// Whether the buffer changed since the last load or successful commit
    pub fn is_changed(&self) -> bool {
        self.inner.state.lock().dirty
    }

    // =========================================================================
    // Buffer access
    // =========================================================================

    fn not_loaded(&self) -> Error {
        Error::NotLoaded {
            cache: self.inner.name.clone(),
        }
    }

    /// Run `f` against the buffer without changing it.
    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let state = self.inner.state.lock();
        let buffer = state.buffer.as_ref().ok_or_else(|| self.not_loaded())?;
        Ok(f(buffer))
    }

    /// Run `f` against the buffer and mark the cache changed.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R> {
        let mut state = self.inner.state.lock();
        let buffer = state.buffer.as_mut().ok_or_else(|| self.not_loaded())?;
        let result = f(buffer);
        state.dirty = true;
        Ok(result)
    }

    /// Run `f` and mark the cache changed only if it reports a change.
    fn update_if(&self, f: impl FnOnce(&mut Vec<T>) -> bool) -> Result<bool> {
        let mut state = self.inner.state.lock();
        let buffer = state.buffer.as_mut().ok_or_else(|| self.not_loaded())?;
        let changed = f(buffer);
        if changed {
            state.dirty = true;
        }
        Ok(changed)
    }

    /// Snapshot of the buffer
    pub fn items(&self) -> Result<Vec<T>> {
        self.read(|items| items.to_vec())
    }

    pub fn len(&self) -> Result<usize> {
        self.read(|items| items.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.read(|items| items.is_empty())
    }

    pub fn contains(&self, item: &T) -> Result<bool> {
        self.read(|items| items.contains(item))
    }

    /// Append an item.
    pub fn push(&self, item: T) -> Result<()> {
        self.update(|items| items.push(item))
    }

    /// Insert an item at the front.
    pub fn prepend(&self, item: T) -> Result<()> {
        self.update(|items| items.insert(0, item))
    }

    /// Append items in order. Returns how many were added.
    pub fn extend(&self, new_items: impl IntoIterator<Item = T>) -> Result<usize> {
        let mut added = 0;
        self.update_if(|items| {
            let before = items.len();
            items.extend(new_items);
            added = items.len() - before;
            added > 0
        })?;
        Ok(added)
    }

    /// Remove every item equal to `item`. Returns true if any was removed.
    pub fn remove(&self, item: &T) -> Result<bool> {
        self.update_if(|items| {
            let before = items.len();
            items.retain(|existing| existing != item);
            items.len() != before
        })
    }

    /// Keep only the items matching `keep`. Returns how many were dropped.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> Result<usize> {
        let mut dropped = 0;
        self.update_if(|items| {
            let before = items.len();
            items.retain(|item| keep(item));
            dropped = before - items.len();
            dropped > 0
        })?;
        Ok(dropped)
    }

    /// Remove all items.
    pub fn clear(&self) -> Result<()> {
        self.update_if(|items| {
            let changed = !items.is_empty();
            items.clear();
            changed
        })?;
        Ok(())
    }

    // =========================================================================
    // Expiration
    // =========================================================================

    /// Stored expiration in milliseconds since the epoch, `None` if unset.
    pub fn expiration(&self) -> Result<Option<i64>> {
        let stored = self
            .inner
            .parts
            .settings
            .get_long(&expiration_key(&self.inner.name))?;
        Ok(stored.filter(|value| *value >= 0))
    }

    pub fn has_expiration(&self) -> Result<bool> {
        Ok(self.expiration()?.is_some())
    }

    /// Store an absolute expiration. A negative timestamp clears it.
    pub fn set_expiration(&self, timestamp_ms: i64) -> Result<()> {
        let key = expiration_key(&self.inner.name);
        if timestamp_ms < 0 {
            self.inner.parts.settings.remove(&key)?;
            debug!(cache = %self.inner.name, "Expiration cleared");
        } else {
            self.inner.parts.settings.put_long(&key, timestamp_ms)?;
            debug!(cache = %self.inner.name, expiration = timestamp_ms, "Expiration set");
        }
        Ok(())
    }

    pub fn clear_expiration(&self) -> Result<()> {
        self.set_expiration(-1)
    }

    /// Expire `span` from now. Returns the stored timestamp.
    pub fn set_expiration_in(&self, span: ExpiresIn) -> Result<i64> {
        let deadline = span.deadline_from(expiration::now_millis())?;
        self.set_expiration(deadline)?;
        Ok(deadline)
    }

    pub fn set_expiration_at(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_expiration(at.timestamp_millis())
    }

    // =========================================================================
    // Limiter
    // =========================================================================

    /// Stored limiter policy, `None` if unlimited.
    pub fn limiter(&self) -> Result<Option<LimiterPolicy>> {
        self.inner
            .parts
            .settings
            .get_string(&limiter_key(&self.inner.name))?
            .map(|policy| policy.parse())
            .transpose()
    }

    /// Store (or with `None`, remove) the limiter policy.
    ///
    /// A loaded buffer that is over the new bound is reduced right away and
    /// the cache is marked changed. The reduction is not written to the store
    /// until the next commit.
    pub fn set_limiter(&self, policy: Option<LimiterPolicy>) -> Result<()> {
        let key = limiter_key(&self.inner.name);
        let Some(policy) = policy else {
            self.inner.parts.settings.remove(&key)?;
            debug!(cache = %self.inner.name, "Limiter removed");
            return Ok(());
        };

        self.inner.parts.settings.put_string(&key, &policy.to_string())?;
        debug!(cache = %self.inner.name, %policy, "Limiter set");

        let mut state = self.inner.state.lock();
        if self.apply_limit(&mut state, &policy) {
            state.dirty = true;
        }
        Ok(())
    }

    /// Reduce the buffer if it is over the bound. Returns true if it was.
    fn apply_limit(&self, state: &mut CacheState<T>, policy: &LimiterPolicy) -> bool {
        let Some(buffer) = state.buffer.take() else {
            return false;
        };

        if !policy.is_over_limit(buffer.as_slice()) {
            state.buffer = Some(buffer);
            return false;
        }

        let before = buffer.len();
        let reduced = policy.reduce(buffer);
        debug!(cache = %self.inner.name, %policy, before, after = reduced.len(), "Limited buffer");
        self.publish(CacheEvent::Limited {
            cache: self.inner.name.clone(),
            policy: policy.to_string(),
            before,
            after: reduced.len(),
            timestamp: Utc::now(),
        });
        state.buffer = Some(reduced);
        true
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Write the buffer to the store, blocking the caller.
    ///
    /// Fails with [`Error::InvalidState`] if nothing changed. An empty buffer
    /// deletes the backing file instead of writing it. On failure the cache
    /// stays changed so the commit can be retried.
    #[instrument(skip(self), fields(cache = %self.inner.name))]
    pub fn commit(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        self.commit_locked(&mut state)
    }

    fn commit_locked(&self, state: &mut CacheState<T>) -> Result<()> {
        let Some(buffer) = state.buffer.as_ref() else {
            return Err(self.not_loaded());
        };
        if !state.dirty {
            return Err(Error::InvalidState {
                cache: self.inner.name.clone(),
            });
        }

        let commit_id = Uuid::new_v4();
        let outcome = if buffer.is_empty() {
            self.delete_backing_file().map(|()| 0)
        } else {
            self.write_buffer(state)
        };

        match outcome {
            Ok(count) => {
                state.dirty = false;
                if count > 0 {
                    info!("Committed {} items", count);
                    self.publish(CacheEvent::Committed {
                        cache: self.inner.name.clone(),
                        commit_id,
                        items: count,
                        timestamp: Utc::now(),
                    });
                }
                Ok(())
            }
            Err(e) => {
                error!("Commit error: {}", e);
                self.publish(CacheEvent::CommitFailed {
                    cache: self.inner.name.clone(),
                    commit_id,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    fn delete_backing_file(&self) -> Result<()> {
        let store = &self.inner.parts.store;
        if store.exists(&self.inner.name)? {
            info!("Deleting cache file of '{}'", self.inner.name);
            store.delete(&self.inner.name)?;
            self.publish(CacheEvent::CacheFileDeleted {
                cache: self.inner.name.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    fn write_buffer(&self, state: &mut CacheState<T>) -> Result<usize> {
        if let Some(policy) = self.limiter()? {
            self.apply_limit(state, &policy);
        }

        let buffer = state.buffer.as_ref().ok_or_else(|| self.not_loaded())?;
        let store = &self.inner.parts.store;

        // a rejected item must leave the old file in place
        let encoded = encode_to_vec(buffer)?;

        store.ensure_directory_exists()?;
        let mut writer = store.open_for_write(&self.inner.name)?;
        write_encoded(&mut *writer, &encoded)?;
        writer.finish()?;

        Ok(buffer.len())
    }
}
