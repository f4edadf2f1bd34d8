//! In-memory Store Adapter
//!
//! Uses DashMap for concurrent access. Intended for tests and for hosts that
//! only need the cache for the lifetime of the process.

use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::ports::{Store, StoreWriter};
use crate::error::{Error, Result};

/// In-memory store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryStoreStats {
    /// Streams currently stored
    pub object_count: u64,
    /// Finished writes
    pub writes: u64,
    /// Deletes that removed a stream
    pub deletes: u64,
}

#[derive(Default)]
struct Shared {
    objects: DashMap<String, Vec<u8>>,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    writes: AtomicU64,
    deletes: AtomicU64,
}

/// In-memory store for testing
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("object_count", &self.shared.objects.len())
            .finish()
    }
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an I/O error (or stop doing so).
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent delete fail with an I/O error (or stop doing so).
    pub fn set_fail_deletes(&self, fail: bool) {
        self.shared.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Raw bytes stored under `name`
    pub fn raw(&self, name: &str) -> Option<Vec<u8>> {
        self.shared.objects.get(name).map(|v| v.clone())
    }

    /// Replace the raw bytes stored under `name`
    pub fn put_raw(&self, name: &str, data: impl Into<Vec<u8>>) {
        self.shared.objects.insert(name.to_string(), data.into());
    }

    pub fn stats(&self) -> InMemoryStoreStats {
        InMemoryStoreStats {
            object_count: self.shared.objects.len() as u64,
            writes: self.shared.writes.load(Ordering::Relaxed),
            deletes: self.shared.deletes.load(Ordering::Relaxed),
        }
    }

    fn check_writable(&self, name: &str) -> Result<()> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::io(
                format!("writing {}", name),
                std::io::Error::other("simulated write failure"),
            ));
        }
        Ok(())
    }
}

impl Store for InMemoryStore {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.shared.objects.contains_key(name))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        if self.shared.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::io(
                format!("deleting {}", name),
                std::io::Error::other("simulated delete failure"),
            ));
        }
        let removed = self.shared.objects.remove(name).is_some();
        if removed {
            self.shared.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    fn open_for_read(&self, name: &str) -> Result<Option<Box<dyn Read + Send>>> {
        Ok(self
            .raw(name)
            .map(|data| Box::new(Cursor::new(data)) as Box<dyn Read + Send>))
    }

    fn open_for_write(&self, name: &str) -> Result<Box<dyn StoreWriter>> {
        self.check_writable(name)?;
        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            name: name.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn ensure_directory_exists(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryWriter {
    store: InMemoryStore,
    name: String,
    buffer: Vec<u8>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.store.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("simulated write failure"));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StoreWriter for MemoryWriter {
    fn finish(self: Box<Self>) -> Result<()> {
        self.store.check_writable(&self.name)?;
        let MemoryWriter {
            store,
            name,
            buffer,
        } = *self;
        store.shared.objects.insert(name, buffer);
        store.shared.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
