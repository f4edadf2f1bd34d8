//! File Store Adapter
//!
//! Implements the `Store` port on the local filesystem: one file
//! `<dir>/<name>.<ext>` per cache.
//!
//! # Design
//!
//! - Writes go to `<file>.tmp` and are renamed over the target on finish, so a
//!   reader sees either the old file or the new one
//! - Direct writes (no rename) are available for filesystems without atomic
//!   rename

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::ports::{Store, StoreWriter};
use crate::error::{Error, Result};

/// Default file extension for cache files
pub const DEFAULT_EXTENSION: &str = "cache";

/// Filesystem-backed store
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory holding the cache files
    dir: PathBuf,
    /// File extension (without dot)
    extension: String,
    /// Write through a temp file and rename
    atomic_writes: bool,
}

impl FileStore {
    /// Create a store rooted at `dir` with atomic writes enabled.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            atomic_writes: true,
        }
    }

    /// Use a different file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Enable or disable temp-file-then-rename writes.
    pub fn with_atomic_writes(mut self, atomic: bool) -> Self {
        self.atomic_writes = atomic;
        self
    }

    /// Directory holding the cache files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the backing file for `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, self.extension))
    }

    fn temp_path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.tmp", name, self.extension))
    }
}

impl Store for FileStore {
    fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name);
        path.try_exists()
            .map_err(|e| Error::io(format!("checking {}", path.display()), e))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(format!("deleting {}", path.display()), e)),
        }
    }

    fn open_for_read(&self, name: &str) -> Result<Option<Box<dyn Read + Send>>> {
        let path = self.path_for(name);
        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(BufReader::new(file)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(format!("opening {}", path.display()), e)),
        }
    }

    fn open_for_write(&self, name: &str) -> Result<Box<dyn StoreWriter>> {
        let target = self.path_for(name);
        let write_path = if self.atomic_writes {
            self.temp_path_for(name)
        } else {
            target.clone()
        };

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&write_path)
            .map_err(|e| Error::io(format!("creating {}", write_path.display()), e))?;

        Ok(Box::new(FileStoreWriter {
            inner: Some(BufWriter::new(file)),
            temp: self.atomic_writes.then_some(write_path),
            target,
        }))
    }

    fn ensure_directory_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::io(format!("creating directory {}", self.dir.display()), e))
    }
}

/// Writer handed out by [`FileStore`]
struct FileStoreWriter {
    inner: Option<BufWriter<File>>,
    /// Temp file to rename on finish (atomic mode only)
    temp: Option<PathBuf>,
    target: PathBuf,
}

impl FileStoreWriter {
    fn writer(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        self.inner
            .as_mut()
            .ok_or_else(|| std::io::Error::other("writer already finished"))
    }
}

impl Write for FileStoreWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer()?.flush()
    }
}

impl StoreWriter for FileStoreWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        let writer = self
            .inner
            .take()
            .ok_or_else(|| Error::io("finishing cache write", std::io::Error::other("already finished")))?;

        let file = writer
            .into_inner()
            .map_err(|e| Error::io(format!("flushing {}", self.target.display()), e.into_error()))?;
        file.sync_all()
            .map_err(|e| Error::io(format!("syncing {}", self.target.display()), e))?;
        drop(file);

        if let Some(temp) = self.temp.take() {
            if let Err(e) = fs::rename(&temp, &self.target) {
                let _ = fs::remove_file(&temp);
                return Err(Error::io(
                    format!("renaming {} to {}", temp.display(), self.target.display()),
                    e,
                ));
            }
        }
        Ok(())
    }
}

impl Drop for FileStoreWriter {
    fn drop(&mut self) {
        // Abandoned atomic write
        if let Some(temp) = self.temp.take() {
            self.inner.take();
            if let Err(e) = fs::remove_file(&temp) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove abandoned {}: {}", temp.display(), e);
                }
            }
        }
    }
}
